//! # Video Transcoder Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Percorre un albero di directory e traccia ogni video in una coda condivisa
//! - Decide per ogni file se la ricodifica conviene e con quale bitrate
//! - Pilota `ffmpeg` con progress live, concorrenza limitata e cancellazione sicura
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione della run e validazione
//! - `error`: Tipi di errore ed esiti della policy
//! - `stats` / `bitrate` / `profile`: Parametri media e motore di qualità
//! - `queue`: Elementi di lavoro, macchina a stati e dispatch
//! - `pipeline`: Stadi scanner, inspector e converter
//! - `ffmpeg`: Probing, encoding e protocollo di progress
//! - `naming` / `file_manager` / `platform`: Path, file e tool esterni
//! - `report` / `json_output`: Report da terminale e JSON
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use video_transcoder::{Config, FfmpegTranscoder, FfprobeProber, Pipeline};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let prober = Arc::new(FfprobeProber::new(config.ffprobe_program()));
//! let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_program(), config.hwaccel.strategy()));
//! let _summary = Pipeline::new(&config, prober, transcoder)?
//!     .run(Path::new("/media"), CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bitrate;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod file_manager;
pub mod json_output;
pub mod naming;
pub mod pipeline;
pub mod platform;
pub mod profile;
pub mod queue;
pub mod report;
pub mod stats;
pub mod utils;

pub use config::Config;
pub use error::{EvaluateError, TranscodeError};
pub use ffmpeg::{FfmpegTranscoder, FfprobeProber, Prober, Request, Transcoder};
pub use pipeline::{Pipeline, Reporting};
pub use profile::{Profile, QualityTier};
pub use queue::{Queue, Status, WorkItem};
pub use report::RunSummary;
pub use stats::VideoStats;
