//! # Probe Module
//!
//! Lancia `ffprobe` e ne converte il report JSON in [`VideoStats`].

use super::Prober;
use crate::error::{Result, TranscodeError};
use crate::stats::VideoStats;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs `ffprobe` and parses its JSON report
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn scan(&self, cancel: &CancellationToken, path: &Path) -> Result<VideoStats> {
        debug!(path = %path.display(), "probing");

        let mut cmd = self.command(path);
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TranscodeError::probe(path, "cancelled")),
            output = cmd.output() => output.map_err(|e| {
                TranscodeError::probe(path, format!("failed to run {}: {}", self.program.display(), e))
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => format!("ffprobe exited with {}", output.status),
                message => message.to_string(),
            };
            return Err(TranscodeError::probe(path, reason));
        }

        let stats = VideoStats::from_probe_json(&String::from_utf8_lossy(&output.stdout))
            .map_err(|reason| TranscodeError::probe(path, reason))?;
        debug!(
            path = %path.display(),
            codec = %stats.video_codec,
            bit_rate = stats.bit_rate,
            height = stats.height,
            "probed"
        );
        Ok(stats)
    }
}
