//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del transcoder.
//!
//! ## Responsabilità:
//! - Definisce la struct [`Config`] con tutti i parametri di pipeline, policy e tool
//! - Fornisce validazione dei parametri prima dell'avvio
//! - Supporta caricamento/salvataggio della configurazione da/verso file JSON
//! - Le chiavi mancanti nel file prendono i valori di default
//!
//! ## Parametri di configurazione:
//! - `extensions`: Estensioni cercate dallo scanner (default: mkv, mp4, avi, mov, m4v, wmv, webm, ts)
//! - `inspectors` / `converters`: Numero di worker paralleli (default: 4 / 1)
//! - `poll_interval_ms`: Periodo di polling dei converter (default: 1000)
//! - `profile`: Codec di destinazione e livello di qualità (default: hevc-low)
//! - `min_height`: Sorgenti più basse vengono rifiutate (default: 0)
//! - `low_quality_factor`: Riduzione della soglia nel livello low (default: 0.8)
//! - `bitrates`: Sostituzione opzionale delle tabelle di bitrate
//! - `overwrite`: Riconverte anche se esiste un target più recente (default: false)
//! - `remove_source`: Elimina la sorgente dopo una conversione riuscita (default: false)
//! - `target_dir`: Directory dei file convertiti (default: None = accanto alla sorgente)
//! - `target_extension`: Estensione del container convertito (default: mkv)
//! - `active`: Avvia con il dispatch automatico abilitato (default: true)
//! - `exit_when_done`: Termina quando ogni file è sistemato (default: true)
//! - `hwaccel`: Backend di encoding (default: auto)
//! - `ffmpeg_path` / `ffprobe_path`: Path espliciti dei tool (default: nomi di piattaforma)
//!
//! ## Validazione:
//! - Controlla che ci sia almeno un'estensione
//! - Controlla che inspectors, converters e poll_interval_ms siano > 0
//! - Controlla che target_extension non sia vuota
//! - Costruisce il profilo per verificare codec, livello e tabelle
//! - Controlla che target_dir, se presente, sia una directory esistente
//!
//! ## Esempio:
//! ```rust
//! use video_transcoder::config::Config;
//!
//! let config = Config {
//!     converters: 2,
//!     remove_source: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::bitrate::BitrateTables;
use crate::ffmpeg::HwAccel;
use crate::platform::PlatformCommands;
use crate::profile::{Profile, ProfileOptions, QualityTier, DEFAULT_LOW_QUALITY_FACTOR};
use crate::utils::to_string_vec;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Target codec and quality tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub codec: String,
    pub tier: QualityTier,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            codec: "hevc".to_string(),
            tier: QualityTier::Low,
        }
    }
}

impl fmt::Display for ProfileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.codec, self.tier)
    }
}

impl FromStr for ProfileConfig {
    type Err = crate::error::TranscodeError;

    /// Parse `<codec>-<tier>`, e.g. `hevc-low` or `av1-max-fixed`
    fn from_str(s: &str) -> crate::error::Result<Self> {
        let (codec, tier) = s.trim().split_once('-').ok_or_else(|| {
            crate::error::TranscodeError::Validation(format!(
                "profile must be <codec>-<tier>: {}",
                s
            ))
        })?;
        Ok(Self {
            codec: codec.to_lowercase(),
            tier: tier.parse()?,
        })
    }
}

/// Configuration for a transcoding run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extensions of the files to scan, without the dot
    pub extensions: Vec<String>,
    /// Number of parallel inspectors
    pub inspectors: usize,
    /// Number of parallel converters
    pub converters: usize,
    /// Converter polling period in milliseconds
    pub poll_interval_ms: u64,
    pub profile: ProfileConfig,
    /// Minimum source height in pixels
    pub min_height: u32,
    /// Threshold reduction of the low quality tier
    pub low_quality_factor: f64,
    /// Bitrate tables replacing the built-in ones
    pub bitrates: Option<BitrateTables>,
    /// Convert even when a newer target already exists
    pub overwrite: bool,
    /// Delete the source once converted
    pub remove_source: bool,
    /// Output directory for converted files (None = next to the source)
    pub target_dir: Option<PathBuf>,
    /// Container extension of converted files
    pub target_extension: String,
    /// Start with automatic dispatch enabled
    pub active: bool,
    /// Stop once every file reached a final state
    pub exit_when_done: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    pub hwaccel: HwAccel,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: to_string_vec(["mkv", "mp4", "avi", "mov", "m4v", "wmv", "webm", "ts"]),
            inspectors: 4,
            converters: 1,
            poll_interval_ms: 1000,
            profile: ProfileConfig::default(),
            min_height: 0,
            low_quality_factor: DEFAULT_LOW_QUALITY_FACTOR,
            bitrates: None,
            overwrite: false,
            remove_source: false,
            target_dir: None,
            target_extension: "mkv".to_string(),
            active: true,
            exit_when_done: true,
            json_output: false,
            hwaccel: HwAccel::default(),
            ffmpeg_path: None,
            ffprobe_path: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.extensions.iter().all(|ext| ext.trim_matches('.').trim().is_empty()) {
            return Err(anyhow!("At least one file extension is required"));
        }

        if self.inspectors == 0 {
            return Err(anyhow!("Number of inspectors must be greater than 0"));
        }

        if self.converters == 0 {
            return Err(anyhow!("Number of converters must be greater than 0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow!("Poll interval must be greater than 0"));
        }

        if self.target_extension.trim_matches('.').is_empty() {
            return Err(anyhow!("Target extension must not be empty"));
        }

        self.build_profile()
            .map_err(|e| anyhow!("Invalid profile {}: {}", self.profile, e))?;

        if let Some(ref target_dir) = self.target_dir {
            if !target_dir.exists() {
                return Err(anyhow!("Target directory does not exist: {}", target_dir.display()));
            }
            if !target_dir.is_dir() {
                return Err(anyhow!("Target path is not a directory: {}", target_dir.display()));
            }
        }

        Ok(())
    }

    /// Profile described by this configuration
    pub fn build_profile(&self) -> crate::error::Result<Profile> {
        let options = ProfileOptions {
            min_height: self.min_height,
            low_quality_factor: self.low_quality_factor,
            tables: self.bitrates.clone().unwrap_or_default(),
        };
        Profile::new(&self.profile.codec, self.profile.tier, options)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ffmpeg_program(&self) -> PathBuf {
        Self::program(&self.ffmpeg_path, "ffmpeg")
    }

    pub fn ffprobe_program(&self) -> PathBuf {
        Self::program(&self.ffprobe_path, "ffprobe")
    }

    fn program(configured: &Option<PathBuf>, base_name: &str) -> PathBuf {
        configured
            .clone()
            .unwrap_or_else(|| PathBuf::from(PlatformCommands::instance().get_command(base_name)))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
