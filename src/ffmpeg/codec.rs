//! # Codec Strategy Module
//!
//! Scelta dell'encoder per ogni backend di accelerazione hardware.
//!
//! ## Responsabilità:
//! - Definisce il trait [`CodecStrategy`]: nomi degli encoder e flag aggiuntivi
//! - Implementa i backend software, VA-API, VideoToolbox e NVENC
//! - Sceglie `-profile:v` in base a codec e profondità di bit
//!
//! Il backend si sceglie da configurazione con [`HwAccel`]; `auto` usa
//! VideoToolbox su macOS e gli encoder software altrove.

use crate::args;
use crate::bitrate::normalize_codec;
use crate::error::TranscodeError;
use crate::stats::VideoStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Maps target codecs to encoder names and contributes backend flags
pub trait CodecStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// ffmpeg encoder for a normalized codec name, `None` when unsupported
    fn encoder_name(&self, codec: &str) -> Option<&'static str>;

    /// Flags placed before `-i`
    fn input_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Pixel format or filter flags for the target
    fn output_args(&self, target: &VideoStats) -> Vec<String>;
}

/// CPU encoders
#[derive(Debug, Clone, Default)]
pub struct SoftwareCodecs;

impl CodecStrategy for SoftwareCodecs {
    fn name(&self) -> &'static str {
        "software"
    }

    fn encoder_name(&self, codec: &str) -> Option<&'static str> {
        match normalize_codec(codec).as_str() {
            "hevc" => Some("libx265"),
            "h264" => Some("libx264"),
            "av1" => Some("libsvtav1"),
            "vp9" => Some("libvpx-vp9"),
            _ => None,
        }
    }

    fn output_args(&self, target: &VideoStats) -> Vec<String> {
        match target.bits_per_sample {
            10 => args!["-pix_fmt", "yuv420p10le"],
            _ => args!["-pix_fmt", "yuv420p"],
        }
    }
}

/// Linux VA-API encoders on a DRM render node
#[derive(Debug, Clone)]
pub struct VaapiCodecs {
    device: String,
}

impl VaapiCodecs {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl Default for VaapiCodecs {
    fn default() -> Self {
        Self::new(VAAPI_DEVICE)
    }
}

impl CodecStrategy for VaapiCodecs {
    fn name(&self) -> &'static str {
        "vaapi"
    }

    fn encoder_name(&self, codec: &str) -> Option<&'static str> {
        match normalize_codec(codec).as_str() {
            "hevc" => Some("hevc_vaapi"),
            "h264" => Some("h264_vaapi"),
            "av1" => Some("av1_vaapi"),
            "vp9" => Some("vp9_vaapi"),
            _ => None,
        }
    }

    fn input_args(&self) -> Vec<String> {
        args![
            "-hwaccel", "vaapi",
            "-hwaccel_device", self.device.as_str(),
            "-hwaccel_output_format", "vaapi",
        ]
    }

    fn output_args(&self, target: &VideoStats) -> Vec<String> {
        match target.bits_per_sample {
            10 => args!["-vf", "scale_vaapi=format=p010"],
            _ => args!["-vf", "scale_vaapi=format=nv12"],
        }
    }
}

/// macOS VideoToolbox encoders
#[derive(Debug, Clone, Default)]
pub struct VideoToolboxCodecs;

impl CodecStrategy for VideoToolboxCodecs {
    fn name(&self) -> &'static str {
        "videotoolbox"
    }

    fn encoder_name(&self, codec: &str) -> Option<&'static str> {
        match normalize_codec(codec).as_str() {
            "hevc" => Some("hevc_videotoolbox"),
            "h264" => Some("h264_videotoolbox"),
            _ => None,
        }
    }

    fn input_args(&self) -> Vec<String> {
        args!["-hwaccel", "videotoolbox"]
    }

    fn output_args(&self, target: &VideoStats) -> Vec<String> {
        match target.bits_per_sample {
            10 => args!["-pix_fmt", "p010le"],
            _ => args!["-pix_fmt", "nv12"],
        }
    }
}

/// NVIDIA NVENC encoders
#[derive(Debug, Clone, Default)]
pub struct NvencCodecs;

impl CodecStrategy for NvencCodecs {
    fn name(&self) -> &'static str {
        "nvenc"
    }

    fn encoder_name(&self, codec: &str) -> Option<&'static str> {
        match normalize_codec(codec).as_str() {
            "hevc" => Some("hevc_nvenc"),
            "h264" => Some("h264_nvenc"),
            "av1" => Some("av1_nvenc"),
            _ => None,
        }
    }

    fn input_args(&self) -> Vec<String> {
        args!["-hwaccel", "cuda"]
    }

    fn output_args(&self, target: &VideoStats) -> Vec<String> {
        match target.bits_per_sample {
            10 => args!["-pix_fmt", "p010le"],
            _ => args!["-pix_fmt", "yuv420p"],
        }
    }
}

/// Acceleration backend named in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    /// VideoToolbox on macOS, software elsewhere
    #[default]
    Auto,
    None,
    Vaapi,
    VideoToolbox,
    Nvenc,
}

impl HwAccel {
    pub fn strategy(&self) -> Arc<dyn CodecStrategy> {
        match self {
            Self::Auto if cfg!(target_os = "macos") => Arc::new(VideoToolboxCodecs),
            Self::Auto | Self::None => Arc::new(SoftwareCodecs),
            Self::Vaapi => Arc::new(VaapiCodecs::default()),
            Self::VideoToolbox => Arc::new(VideoToolboxCodecs),
            Self::Nvenc => Arc::new(NvencCodecs),
        }
    }
}

impl FromStr for HwAccel {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" | "software" => Ok(Self::None),
            "vaapi" => Ok(Self::Vaapi),
            "videotoolbox" => Ok(Self::VideoToolbox),
            "nvenc" | "cuda" => Ok(Self::Nvenc),
            other => Err(TranscodeError::Validation(format!(
                "unknown hardware acceleration: {}",
                other
            ))),
        }
    }
}

/// `-profile:v` value for the target, when the encoder takes one
pub(crate) fn encoder_profile(target: &VideoStats) -> Option<&'static str> {
    match (normalize_codec(&target.video_codec).as_str(), target.bits_per_sample) {
        ("hevc", 10) => Some("main10"),
        ("hevc", _) | ("av1", _) => Some("main"),
        ("h264", 8) => Some("high"),
        _ => None,
    }
}
