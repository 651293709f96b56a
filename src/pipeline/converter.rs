//! # Converter Module
//!
//! Worker di conversione: interroga la coda a intervalli e pilota il transcoder.
//!
//! ## Flusso per elemento:
//! 1. Determina i parametri di destinazione (probe su richiesta per gli elementi forzati)
//! 2. Calcola il path di destinazione
//! 3. Salta l'elemento se esiste un target più recente, salvo `overwrite`
//! 4. Converte, aggiornando il progress dell'elemento
//! 5. In caso di errore rimuove il target parziale, in caso di successo
//!    rimuove la sorgente se richiesto

use crate::error::Result;
use crate::ffmpeg::{Prober, Request, Transcoder};
use crate::file_manager::{FileChecker, FileManager};
use crate::naming::build_target_filename;
use crate::profile::Profile;
use crate::queue::{ProgressUpdate, Queue, WorkItem};
use crate::report::ConversionTotals;
use crate::stats::VideoStats;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Opzioni di output condivise da tutti i converter
#[derive(Debug, Clone)]
pub(crate) struct ConvertSettings {
    pub overwrite: bool,
    pub remove_source: bool,
    pub target_dir: Option<PathBuf>,
    pub target_extension: String,
    pub poll_interval: Duration,
}

#[derive(Clone)]
pub(crate) struct Converter {
    pub queue: Arc<Queue>,
    pub profile: Arc<Profile>,
    pub prober: Arc<dyn Prober>,
    pub transcoder: Arc<dyn Transcoder>,
    pub checker: Arc<dyn FileChecker>,
    pub settings: Arc<ConvertSettings>,
    pub totals: Arc<ConversionTotals>,
}

impl Converter {
    /// Cerca lavoro a ogni tick fino alla cancellazione
    pub async fn run(self, id: usize, cancel: CancellationToken) {
        debug!(converter = id, "converter started");
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            while let Some(item) = self.queue.next_to_convert() {
                self.convert(&cancel, &item).await;
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
        debug!(converter = id, "converter stopped");
    }

    /// Converte un elemento preso in carico e ne fissa lo stato finale
    pub async fn convert(&self, cancel: &CancellationToken, item: &Arc<WorkItem>) {
        let source = item.source();

        let target_stats = match self.target_stats(cancel, item).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(path = %source.display(), "cannot determine target: {}", e);
                settle(item.set_failed(e.to_string()));
                return;
            }
        };

        let target = build_target_filename(
            source,
            self.settings.target_dir.as_deref(),
            self.profile.target_codec(),
            &self.settings.target_extension,
        );
        item.set_target(target.clone());

        if !self.settings.overwrite {
            match self.checker.target_is_newer(source, &target) {
                Ok(true) => {
                    info!(path = %source.display(), target = %target.display(), "target is up to date");
                    settle(item.set_skipped("target is newer than source"));
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!("cannot compare with existing target: {}", e),
            }
        }

        let source_size = match FileManager::get_file_info(source).await {
            Ok((size, _)) => Some(size),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };

        let reporter = Arc::clone(item);
        let request = Request::new(source, target.clone(), target_stats).with_progress(Arc::new(
            move |update: ProgressUpdate| reporter.progress().update(&update),
        ));

        info!(path = %source.display(), target = %target.display(), "converting");
        match self.transcoder.convert(cancel, request).await {
            Ok(()) => {
                if let (Some(before), Ok((after, _))) =
                    (source_size, FileManager::get_file_info(&target).await)
                {
                    self.totals.add(before, after);
                }
                info!(path = %source.display(), "converted");
                settle(item.set_converted());

                if self.settings.remove_source {
                    match FileManager::remove_file(source).await {
                        Ok(()) => debug!(path = %source.display(), "source removed"),
                        Err(e) => warn!("failed to remove source: {}", e),
                    }
                }
            }
            Err(e) => {
                error!(path = %source.display(), "conversion failed: {}", e);
                if let Err(e) = FileManager::remove_file(&target).await {
                    warn!("failed to remove partial target: {}", e);
                }
                settle(item.set_failed(e.to_string()));
            }
        }
    }

    /// Parametri di destinazione dell'elemento, calcolati su richiesta per
    /// gli elementi forzati prima dell'ispezione
    async fn target_stats(&self, cancel: &CancellationToken, item: &WorkItem) -> Result<VideoStats> {
        if let Some(stats) = item.target_stats() {
            return Ok(stats);
        }
        let source = match item.source_stats() {
            Some(stats) => stats,
            None => {
                let stats = self.prober.scan(cancel, item.source()).await?;
                item.set_source_stats(stats.clone())?;
                stats
            }
        };
        let target = self.profile.target_stats(&source)?;
        item.set_target_stats(target.clone());
        Ok(target)
    }
}

fn settle(outcome: Result<()>) {
    if let Err(e) = outcome {
        debug!("{}", e);
    }
}
