//! # External Tools Module
//!
//! Questo modulo isola i programmi esterni di probing ed encoding dietro due
//! trait, con le implementazioni basate su ffmpeg.
//!
//! ## Componenti principali:
//! - [`Prober`] / [`FfprobeProber`]: Statistiche media di un file
//! - [`Transcoder`] / [`FfmpegTranscoder`]: Una conversione con progress live
//! - [`CodecStrategy`]: Nomi degli encoder e flag hardware per backend
//! - [`ProgressParser`] / [`ProgressSocket`]: Il protocollo `-progress`
//!
//! ## Cancellazione:
//! - Ogni operazione riceve un `CancellationToken`
//! - L'encoder parte nel proprio process group, che viene terminato alla cancellazione
//! - Una [`Request`] invalida viene rifiutata prima di avviare qualsiasi processo

mod codec;
mod probe;
mod progress;
#[cfg(all(test, target_os = "linux"))]
pub(crate) mod testing;
mod transcode;

pub use codec::{CodecStrategy, HwAccel, NvencCodecs, SoftwareCodecs, VaapiCodecs, VideoToolboxCodecs};
pub use probe::FfprobeProber;
pub use progress::{ProgressParser, ProgressSocket};
pub use transcode::FfmpegTranscoder;

use crate::error::{Result, TranscodeError};
use crate::queue::ProgressUpdate;
use crate::stats::VideoStats;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receives every progress record of a running conversion
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Reads media properties of a file
#[async_trait]
pub trait Prober: Send + Sync {
    async fn scan(&self, cancel: &CancellationToken, path: &Path) -> Result<VideoStats>;
}

/// Encodes one source into one target
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, cancel: &CancellationToken, request: Request) -> Result<()>;
}

/// One conversion to perform
#[derive(Clone)]
pub struct Request {
    pub source: PathBuf,
    pub target: PathBuf,
    pub target_stats: VideoStats,
    pub on_progress: Option<ProgressCallback>,
}

impl Request {
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        target_stats: VideoStats,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            target_stats,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Reject malformed requests before any process is spawned
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(TranscodeError::Validation("missing source path".into()));
        }
        if self.target.as_os_str().is_empty() {
            return Err(TranscodeError::Validation("missing target path".into()));
        }
        if self.source == self.target {
            return Err(TranscodeError::Validation(format!(
                "target equals source: {}",
                self.source.display()
            )));
        }
        self.target_stats.validate()
    }

    pub(crate) fn report(&self, update: ProgressUpdate) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(update);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("target_stats", &self.target_stats)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}
