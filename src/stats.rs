//! # Video Stats Module
//!
//! Risultati immutabili del probe di un singolo file video.
//!
//! `VideoStats` viene prodotto una volta per sorgente dal [`Prober`](crate::ffmpeg::Prober)
//! e una volta per sorgente accettata da [`Profile::evaluate`](crate::profile::Profile::evaluate)
//! (i parametri di destinazione). Non viene mai modificato dopo.
//!
//! ## Formato del probe:
//! ```json
//! {
//!   "format": { "duration": "60.000000", "bit_rate": "4000000" },
//!   "streams": [
//!     { "codec_type": "video", "codec_name": "h264", "height": 720,
//!       "width": 1280, "bits_per_raw_sample": "8" }
//!   ]
//! }
//! ```

use crate::error::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Properties of the primary video stream of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    pub video_codec: String,
    /// Bits per second
    pub bit_rate: u64,
    /// 8 or 10
    pub bits_per_sample: u8,
    pub height: u32,
    pub width: u32,
    pub duration: Duration,
}

impl VideoStats {
    /// Parse the JSON printed by `ffprobe -print_format json -show_format -show_streams`
    pub fn from_probe_json(output: &str) -> Result<Self, String> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            height: Option<u32>,
            width: Option<u32>,
            bits_per_raw_sample: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output)
            .map_err(|e| format!("failed to parse probe output: {}", e))?;

        let stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| "no video stream found".to_string())?;

        let video_codec = stream
            .codec_name
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "video stream has no codec name".to_string())?;

        let bit_rate = probe
            .format
            .bit_rate
            .as_deref()
            .and_then(|b| b.parse::<u64>().ok())
            .unwrap_or(0);

        let duration = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or_default();

        // ffprobe omits bits_per_raw_sample for some 8 bit streams
        let bits_per_sample = match stream.bits_per_raw_sample.as_deref() {
            None => 8,
            Some(raw) => match raw.parse::<u8>() {
                Ok(bits @ (8 | 10)) => bits,
                _ => return Err(format!("unsupported bit depth: {}", raw)),
            },
        };

        Ok(Self {
            video_codec,
            bit_rate,
            bits_per_sample,
            height: stream.height.unwrap_or(0),
            width: stream.width.unwrap_or(0),
            duration,
        })
    }

    /// Validate the invariants a conversion request relies on
    pub fn validate(&self) -> Result<()> {
        if self.video_codec.is_empty() {
            return Err(TranscodeError::Validation("missing video codec".into()));
        }
        if !matches!(self.bits_per_sample, 8 | 10) {
            return Err(TranscodeError::Validation(format!(
                "invalid bit depth: {}",
                self.bits_per_sample
            )));
        }
        if self.bit_rate == 0 {
            return Err(TranscodeError::Validation("bitrate is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: &str = r#"{
        "streams": [
            { "codec_type": "audio", "codec_name": "aac" },
            { "codec_type": "video", "codec_name": "h264", "height": 720, "width": 1280, "bits_per_raw_sample": "8" }
        ],
        "format": { "duration": "60.500000", "bit_rate": "4000000" }
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let stats = VideoStats::from_probe_json(PROBE).unwrap();
        assert_eq!(stats.video_codec, "h264");
        assert_eq!(stats.bit_rate, 4_000_000);
        assert_eq!(stats.bits_per_sample, 8);
        assert_eq!(stats.height, 720);
        assert_eq!(stats.width, 1280);
        assert_eq!(stats.duration, Duration::from_millis(60_500));
    }

    #[test]
    fn test_parse_probe_defaults_bit_depth() {
        let json = r#"{
            "streams": [{ "codec_type": "video", "codec_name": "hevc", "height": 1080, "width": 1920 }],
            "format": { "duration": "1.0", "bit_rate": "100" }
        }"#;
        let stats = VideoStats::from_probe_json(json).unwrap();
        assert_eq!(stats.bits_per_sample, 8);
    }

    #[test]
    fn test_parse_probe_rejects_bad_input() {
        assert!(VideoStats::from_probe_json("not json").is_err());

        let no_video = r#"{ "streams": [{ "codec_type": "audio", "codec_name": "aac" }], "format": {} }"#;
        let err = VideoStats::from_probe_json(no_video).unwrap_err();
        assert!(err.contains("no video stream"));

        let twelve_bit = r#"{
            "streams": [{ "codec_type": "video", "codec_name": "hevc", "bits_per_raw_sample": "12" }],
            "format": {}
        }"#;
        assert!(VideoStats::from_probe_json(twelve_bit).is_err());
    }

    #[test]
    fn test_validate() {
        let mut stats = VideoStats::from_probe_json(PROBE).unwrap();
        assert!(stats.validate().is_ok());

        stats.bit_rate = 0;
        assert!(stats.validate().is_err());

        stats.bit_rate = 1;
        stats.bits_per_sample = 12;
        assert!(stats.validate().is_err());
    }
}
