//! # Inspector Module
//!
//! Worker di ispezione: probe del file e applicazione del profilo.
//! Gli inspector condividono il lato ricevente del canale dello scanner.

use crate::error::EvaluateError;
use crate::ffmpeg::Prober;
use crate::profile::Profile;
use crate::queue::WorkItem;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Receiver condiviso dal pool di inspector
pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<Arc<WorkItem>>>>;

#[derive(Clone)]
pub(crate) struct Inspector {
    pub prober: Arc<dyn Prober>,
    pub profile: Arc<Profile>,
}

impl Inspector {
    /// Ispeziona elementi finché il canale si chiude o la run viene cancellata
    pub async fn run(self, id: usize, rx: SharedReceiver, cancel: CancellationToken) {
        debug!(inspector = id, "inspector started");
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = async { rx.lock().await.recv().await } => next,
            };
            let Some(item) = next else { break };
            self.inspect(&cancel, &item).await;
        }
        debug!(inspector = id, "inspector stopped");
    }

    /// Probe di un elemento e applicazione del profilo
    pub async fn inspect(&self, cancel: &CancellationToken, item: &WorkItem) {
        let path = item.source();
        if let Err(e) = item.set_inspecting() {
            debug!("not inspecting: {}", e);
            return;
        }

        let source = match self.prober.scan(cancel, path).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(path = %path.display(), "probe failed: {}", e);
                if let Err(e) = item.set_inspection_failed(e.to_string()) {
                    debug!("{}", e);
                }
                return;
            }
        };
        if let Err(e) = item.set_probed(source.clone()) {
            // claimed by a manual conversion meanwhile
            debug!("{}", e);
            return;
        }

        let outcome = match self.profile.evaluate(&source) {
            Ok(target) => {
                debug!(
                    path = %path.display(),
                    from = source.bit_rate,
                    to = target.bit_rate,
                    "accepted"
                );
                item.set_inspected(target)
            }
            Err(EvaluateError::Skip) => {
                let reason = format!("already {}", self.profile.target_codec());
                info!(path = %path.display(), "skipped: {}", reason);
                item.set_inspection_skipped(reason)
            }
            Err(EvaluateError::Reject(reason)) => {
                info!(path = %path.display(), "rejected: {}", reason);
                item.set_rejected(reason)
            }
            Err(EvaluateError::Error(e)) => {
                error!(path = %path.display(), "evaluation failed: {}", e);
                item.set_inspection_failed(e.to_string())
            }
        };
        if let Err(e) = outcome {
            debug!("{}", e);
        }
    }
}
