//! # Transcode Module
//!
//! Esecuzione di `ffmpeg` per una singola [`Request`].
//!
//! ## Flusso di esecuzione:
//! 1. Valida la richiesta e risolve l'encoder dalla [`CodecStrategy`]
//! 2. Apre il [`ProgressSocket`] e costruisce la command line
//! 3. Avvia ffmpeg nel proprio process group
//! 4. Attende l'uscita dell'encoder o la cancellazione; alla cancellazione
//!    termina l'intero gruppo e raccoglie il processo
//! 5. Lascia al lettore del progress il tempo di svuotare lo stream

use super::codec::encoder_profile;
use super::{CodecStrategy, ProgressSocket, Request, Transcoder};
use crate::args;
use crate::error::{Result, TranscodeError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Time the progress reader gets to drain after the encoder exits
const PROGRESS_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs `ffmpeg` with flags from a [`CodecStrategy`]
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    strategy: Arc<dyn CodecStrategy>,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, strategy: Arc<dyn CodecStrategy>) -> Self {
        Self {
            program: program.into(),
            strategy,
        }
    }

    fn build_args(&self, request: &Request, encoder: &str, progress_url: &str) -> Vec<OsString> {
        let target = &request.target_stats;

        let mut args = args!["-hide_banner", "-nostats", "-loglevel", "error", "-y"];
        args.extend(self.strategy.input_args());
        args.push("-i".into());
        let mut args: Vec<OsString> = args.into_iter().map(OsString::from).collect();
        args.push(request.source.clone().into_os_string());

        let mut video = args!["-map", "0", "-c:v", encoder];
        if let Some(profile) = encoder_profile(target) {
            video.extend(args!["-profile:v", profile]);
        }
        video.extend(self.strategy.output_args(target));
        video.extend(args!["-b:v", target.bit_rate]);

        video.extend(args![
            "-c:a", "copy",
            "-c:s", "copy",
            "-f", "matroska",
            "-progress", progress_url,
        ]);

        args.extend(video.into_iter().map(OsString::from));
        args.push(request.target.clone().into_os_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, cancel: &CancellationToken, request: Request) -> Result<()> {
        request.validate()?;
        let codec = &request.target_stats.video_codec;
        let encoder = self.strategy.encoder_name(codec).ok_or_else(|| {
            TranscodeError::Validation(format!(
                "codec {} has no {} encoder",
                codec,
                self.strategy.name()
            ))
        })?;

        let socket = ProgressSocket::bind()?;
        let args = self.build_args(&request, encoder, &socket.url());
        debug!(
            source = %request.source.display(),
            target = %request.target.display(),
            encoder,
            bit_rate = request.target_stats.bit_rate,
            "starting encoder"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            TranscodeError::conversion(
                &request.source,
                &request.target,
                format!("failed to start {}: {}", self.program.display(), e),
            )
        })?;
        let pid = child.id();
        let start_time = Instant::now();

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    debug!(error = %e, "encoder stderr unreadable");
                }
            }
            buf
        });

        let socket_cancel = cancel.child_token();
        let reporter = request.clone();
        let mut progress_task = tokio::spawn(
            socket.serve(socket_cancel.clone(), move |update| reporter.report(update)),
        );

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            waited = child.wait() => Some(waited),
        };

        let Some(waited) = waited else {
            kill_process_group(pid);
            if let Err(e) = child.wait().await {
                debug!(error = %e, "encoder not reaped");
            }
            stderr_task.abort();
            drain_progress(&mut progress_task, &socket_cancel).await;
            return Err(TranscodeError::conversion(
                &request.source,
                &request.target,
                "cancelled",
            ));
        };
        drain_progress(&mut progress_task, &socket_cancel).await;

        let status = waited
            .map_err(|e| TranscodeError::conversion(&request.source, &request.target, e))?;
        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            let stderr = String::from_utf8_lossy(&stderr);
            let reason = match stderr.trim() {
                "" => format!("encoder exited with {}", status),
                message => message.to_string(),
            };
            return Err(TranscodeError::conversion(
                &request.source,
                &request.target,
                reason,
            ));
        }

        debug!(
            target = %request.target.display(),
            elapsed = %format!("{:.1}s", start_time.elapsed().as_secs_f64()),
            "encoder finished"
        );
        Ok(())
    }
}

/// Let the progress reader consume what the encoder wrote, then stop it
async fn drain_progress(task: &mut JoinHandle<Result<()>>, cancel: &CancellationToken) {
    let joined = match tokio::time::timeout(PROGRESS_DRAIN_TIMEOUT, &mut *task).await {
        Ok(joined) => joined,
        Err(_) => {
            cancel.cancel();
            task.await
        }
    };
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "progress stream error"),
        Err(e) => warn!("progress reader failed: {}", e),
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // the encoder leads its own group, so this reaches its helpers too
    // SAFETY: `pid` belongs to a child we spawned with `process_group(0)`,
    // so it is the id of a group we created; killpg touches no memory.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
