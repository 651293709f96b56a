//! # Pipeline Module
//!
//! Orchestratore principale: esegue gli stadi scan → inspect → convert su un
//! albero di directory.
//!
//! ## Stadi:
//! - **Scanner**: un task che percorre l'albero; ogni file trovato viene aggiunto
//!   alla coda e passato su un canale di capacità 1, così la scansione non va
//!   mai molto più avanti degli inspector
//! - **Inspector**: N task che condividono il lato ricevente; ognuno fa il probe
//!   di un file e applica il [`Profile`]
//! - **Converter**: M task che interrogano [`Queue::next_to_convert`] a intervalli
//!
//! ## Terminazione:
//! - Tutti gli stadi si fermano sul [`CancellationToken`] della run
//! - Gli errori su un singolo file cambiano solo lo stato di quel file
//! - Una scansione che non può partire fa fallire l'intera run
//!
//! ## Esempio:
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use video_transcoder::config::Config;
//! use video_transcoder::ffmpeg::{FfmpegTranscoder, FfprobeProber};
//! use video_transcoder::pipeline::Pipeline;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let prober = Arc::new(FfprobeProber::new(config.ffprobe_program()));
//! let transcoder = Arc::new(FfmpegTranscoder::new(
//!     config.ffmpeg_program(),
//!     config.hwaccel.strategy(),
//! ));
//! let pipeline = Pipeline::new(&config, prober, transcoder)?;
//! let summary = pipeline.run(Path::new("/media"), CancellationToken::new()).await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```

mod converter;
mod inspector;
mod scanner;

use crate::config::Config;
use crate::ffmpeg::{Prober, Transcoder};
use crate::file_manager::{FileChecker, FsFileChecker};
use crate::json_output::JsonMessage;
use crate::profile::Profile;
use crate::queue::{Queue, QueueSnapshot, Status, WorkItem};
use crate::report::{ConversionTotals, ProgressManager, RunSummary};
use anyhow::{Context, Result};
use converter::{ConvertSettings, Converter};
use inspector::Inspector;
use scanner::Scanner;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the orchestrator checks whether all work is settled
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Refresh period of the progress bar and JSON status events
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Where live status goes while the pipeline runs
#[derive(Clone, Default)]
pub enum Reporting {
    #[default]
    Silent,
    Terminal(ProgressManager),
    /// Newline-delimited [`JsonMessage`] events on stdout
    Json,
}

impl Reporting {
    fn publish(&self, snapshot: &QueueSnapshot, reported: &mut HashSet<PathBuf>) {
        let settled: Vec<_> = snapshot
            .items
            .iter()
            .filter(|item| item.status.is_terminal() && !reported.contains(&item.source))
            .collect();

        match self {
            Self::Silent => {}
            Self::Terminal(bar) => {
                bar.update(snapshot);
                for item in &settled {
                    if item.status == Status::Failed {
                        bar.println(&format!(
                            "✗ {}: {}",
                            item.source.display(),
                            item.err.as_deref().unwrap_or("failed")
                        ));
                    }
                }
            }
            Self::Json => {
                JsonMessage::status(snapshot).emit();
                for item in &settled {
                    JsonMessage::file_complete(item).emit();
                }
            }
        }

        reported.extend(settled.into_iter().map(|item| item.source.clone()));
    }

    fn close(&self) {
        if let Self::Terminal(bar) = self {
            bar.finish("done");
        }
    }
}

/// Orchestratore scan → inspect → convert
pub struct Pipeline {
    queue: Arc<Queue>,
    profile: Arc<Profile>,
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    checker: Arc<dyn FileChecker>,
    settings: Arc<ConvertSettings>,
    extensions: Vec<String>,
    inspectors: usize,
    converters: usize,
    exit_when_done: bool,
    reporting: Reporting,
    totals: Arc<ConversionTotals>,
    forced: HashSet<PathBuf>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        config.validate()?;
        let profile = config.build_profile()?;

        Ok(Self {
            queue: Arc::new(Queue::new(config.active)),
            profile: Arc::new(profile),
            prober,
            transcoder,
            checker: Arc::new(FsFileChecker),
            settings: Arc::new(ConvertSettings {
                overwrite: config.overwrite,
                remove_source: config.remove_source,
                target_dir: config.target_dir.clone(),
                target_extension: config.target_extension.clone(),
                poll_interval: config.poll_interval(),
            }),
            extensions: config.extensions.clone(),
            inspectors: config.inspectors,
            converters: config.converters,
            exit_when_done: config.exit_when_done,
            reporting: Reporting::Silent,
            totals: Arc::new(ConversionTotals::default()),
            forced: HashSet::new(),
        })
    }

    pub fn with_file_checker(mut self, checker: Arc<dyn FileChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_reporting(mut self, reporting: Reporting) -> Self {
        self.reporting = reporting;
        self
    }

    /// Convert `path` ahead of everything else, whatever the profile says.
    ///
    /// The scanner will not hand a forced path to the inspectors.
    pub fn force(&mut self, path: impl Into<PathBuf>) -> Arc<WorkItem> {
        let path = path.into();
        let item = self.queue.add(path.clone());
        self.queue.queue(&item);
        self.forced.insert(path);
        item
    }

    /// Shared queue, for toggling dispatch or queueing items while running
    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    /// Run all stages over `root` until the work is settled or `cancel` fires
    pub async fn run(self, root: &Path, cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        let workers = cancel.child_token();
        info!(
            root = %root.display(),
            profile = %self.profile.name(),
            inspectors = self.inspectors,
            converters = self.converters,
            "pipeline starting"
        );

        let (tx, rx) = mpsc::channel(1);
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();

        let inspector = Inspector {
            prober: Arc::clone(&self.prober),
            profile: Arc::clone(&self.profile),
        };
        for id in 0..self.inspectors {
            tasks.spawn(inspector.clone().run(id, Arc::clone(&rx), workers.clone()));
        }
        drop(rx);

        let converter = Converter {
            queue: Arc::clone(&self.queue),
            profile: Arc::clone(&self.profile),
            prober: Arc::clone(&self.prober),
            transcoder: Arc::clone(&self.transcoder),
            checker: Arc::clone(&self.checker),
            settings: Arc::clone(&self.settings),
            totals: Arc::clone(&self.totals),
        };
        for id in 0..self.converters {
            tasks.spawn(converter.clone().run(id, workers.clone()));
        }

        let reporter = tokio::spawn(report(
            Arc::clone(&self.queue),
            self.reporting.clone(),
            workers.clone(),
        ));

        let scanner = Scanner {
            root: root.to_path_buf(),
            extensions: self.extensions.clone(),
            known: self.forced.clone(),
        };
        let scanned = tokio::spawn(scanner.run(Arc::clone(&self.queue), tx, workers.clone()))
            .await
            .context("scanner task failed");

        let outcome = match scanned {
            Ok(Ok(found)) => {
                debug!(found, "waiting for workers");
                self.wait(&cancel).await;
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("scan failed")),
            Err(e) => Err(e),
        };

        workers.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("worker task failed: {}", e);
            }
        }
        if let Err(e) = reporter.await {
            warn!("reporter task failed: {}", e);
        }
        self.reporting.close();
        outcome?;

        let summary = RunSummary::new(&self.queue.snapshot(), &self.totals, started.elapsed());
        info!(
            converted = summary.converted,
            skipped = summary.skipped,
            rejected = summary.rejected,
            failed = summary.failed,
            elapsed = %format!("{:.1}s", summary.duration_seconds),
            "pipeline finished"
        );
        Ok(summary)
    }

    async fn wait(&self, cancel: &CancellationToken) {
        if !self.exit_when_done {
            cancel.cancelled().await;
            return;
        }
        let mut ticker = tokio::time::interval(SETTLE_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.queue.is_settled() {
                        return;
                    }
                }
            }
        }
    }
}

/// Pubblica gli snapshot della coda fino alla cancellazione, poi un'ultima volta
async fn report(queue: Arc<Queue>, reporting: Reporting, cancel: CancellationToken) {
    let mut reported = HashSet::new();
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    loop {
        let stop = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = ticker.tick() => false,
        };
        reporting.publish(&queue.snapshot(), &mut reported);
        if stop {
            break;
        }
    }
}
