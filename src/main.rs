//! # Video Transcoder - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Unione del file di configurazione con gli override da CLI
//! - Verifica di `ffmpeg` e `ffprobe` e avvio della pipeline
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti e configura il logging (INFO, o DEBUG con `--verbose`; `RUST_LOG` ha la precedenza)
//! 2. Carica il file di configurazione (default se assente) e applica gli override
//! 3. Valida la configurazione e i tool esterni
//! 4. Esegue la pipeline finché ogni file è sistemato o arriva Ctrl-C
//! 5. Stampa il riepilogo, oppure lo emette in JSON
//!
//! ## Esempio di utilizzo:
//! ```bash
//! video-transcoder /srv/media --profile hevc-high --converters 2 --target-dir /srv/out
//! ```

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use video_transcoder::config::ProfileConfig;
use video_transcoder::ffmpeg::HwAccel;
use video_transcoder::json_output::JsonMessage;
use video_transcoder::platform::PlatformCommands;
use video_transcoder::report::ProgressManager;
use video_transcoder::{Config, FfmpegTranscoder, FfprobeProber, Pipeline, Reporting};

#[derive(Parser)]
#[command(name = "video-transcoder")]
#[command(about = "Re-encode a video library when the bitrate policy says it pays off")]
struct Args {
    /// Directory containing the videos to transcode
    media_directory: PathBuf,

    /// Configuration file (JSON); missing keys take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target codec and quality tier, e.g. hevc-low, av1-max-fixed
    #[arg(short, long)]
    profile: Option<ProfileConfig>,

    /// Number of parallel inspectors
    #[arg(short, long)]
    inspectors: Option<usize>,

    /// Number of parallel converters
    #[arg(short = 'j', long)]
    converters: Option<usize>,

    /// Encoder backend: auto, none, vaapi, videotoolbox, nvenc
    #[arg(long)]
    hwaccel: Option<HwAccel>,

    /// Output directory for converted files (default: next to the source)
    #[arg(short, long)]
    target_dir: Option<PathBuf>,

    /// Convert even when a newer target already exists
    #[arg(long)]
    overwrite: bool,

    /// Delete each source once it has been converted
    #[arg(long)]
    remove_source: bool,

    /// Start with automatic dispatch disabled; only --force files are converted
    #[arg(long)]
    paused: bool,

    /// Keep running after all files are settled, until Ctrl-C
    #[arg(long)]
    keep_running: bool,

    /// Output progress and results as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Convert these files first, whatever the profile decides
    #[arg(long, num_args = 1..)]
    force: Vec<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ref profile) = self.profile {
            config.profile = profile.clone();
        }
        if let Some(inspectors) = self.inspectors {
            config.inspectors = inspectors;
        }
        if let Some(converters) = self.converters {
            config.converters = converters;
        }
        if let Some(hwaccel) = self.hwaccel {
            config.hwaccel = hwaccel;
        }
        if let Some(ref target_dir) = self.target_dir {
            config.target_dir = Some(target_dir.clone());
        }
        config.overwrite |= self.overwrite;
        config.remove_source |= self.remove_source;
        config.json_output |= self.json;
        if self.paused {
            config.active = false;
        }
        if self.keep_running {
            config.exit_when_done = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout is reserved for JSON events
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);

    if let Some(ref path) = args.save_config {
        config.validate()?;
        config.save_to_file(path).await?;
        info!("Configuration saved to {}", path.display());
        return Ok(());
    }

    let json = config.json_output;
    match run(&args, config).await {
        Err(e) if json => {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
            Err(e)
        }
        outcome => outcome,
    }
}

async fn run(args: &Args, config: Config) -> Result<()> {
    if !args.media_directory.is_dir() {
        return Err(anyhow!(
            "Media directory does not exist: {}",
            args.media_directory.display()
        ));
    }
    let root = canonical(&args.media_directory)?;
    config.validate()?;

    info!("Running on {}", PlatformCommands::system_info());
    let ffmpeg = config.ffmpeg_program();
    let ffprobe = config.ffprobe_program();
    PlatformCommands::instance()
        .check_dependencies(&[ffmpeg.as_path(), ffprobe.as_path()])
        .await?;

    let strategy = config.hwaccel.strategy();
    info!("Using {} encoders", strategy.name());
    let prober = Arc::new(FfprobeProber::new(ffprobe));
    let transcoder = Arc::new(FfmpegTranscoder::new(ffmpeg, strategy));

    let reporting = if config.json_output {
        JsonMessage::start(root.clone(), &config).emit();
        Reporting::Json
    } else {
        Reporting::Terminal(ProgressManager::new())
    };

    let mut pipeline = Pipeline::new(&config, prober, transcoder)?.with_reporting(reporting);
    for path in &args.force {
        let path = canonical(path)?;
        if !path.starts_with(&root) {
            warn!("{} is outside {}", path.display(), root.display());
        }
        pipeline.force(path);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping conversions");
                cancel.cancel();
            }
        }
    });

    let summary = pipeline.run(&root, cancel).await?;
    if config.json_output {
        JsonMessage::complete(summary).emit();
    } else {
        println!("{}", summary.format_summary());
    }
    Ok(())
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Cannot resolve {}", path.display()))
}
