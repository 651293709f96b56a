//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom del transcoder.
//!
//! ## Responsabilità:
//! - Definisce `TranscodeError` per categorizzare gli errori di ogni stadio
//! - Fornisce messaggi di errore descrittivi con il path coinvolto
//! - Integra con `thiserror` per la conversione automatica da `std::io::Error`
//! - Separa gli esiti della policy in [`EvaluateError`]
//!
//! ## Categorie di errori:
//! - `Validation`: Richiesta di conversione malformata, rifiutata prima di avviare processi
//! - `Probe`: Il tool di probing è fallito o il suo output non è leggibile
//! - `Conversion`: L'encoder non è partito o è uscito con codice non zero
//! - `Filesystem`: Errori di stat/rimozione attorno a una conversione
//! - `UnknownCodec`: Codec assente dalle tabelle di bitrate
//! - `MissingDependency`: Tool esterno non installato (ffmpeg, ffprobe)
//!
//! ## Esiti della policy:
//! Gli esiti di [`Profile`](crate::profile::Profile) non sono errori veri:
//! `Skip` e `Reject` sono risultati attesi, solo `Error` è un fallimento.

use std::path::PathBuf;

/// Errors raised by the transcoding engine
#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid conversion request: {0}")]
    Validation(String),

    #[error("probe failed for {}: {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("conversion of {} to {} failed: {reason}", .source_path.display(), .target_path.display())]
    Conversion {
        source_path: PathBuf,
        target_path: PathBuf,
        reason: String,
    },

    #[error("filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported codec: {0}")]
    UnknownCodec(String),

    #[error("dependency missing: {0}")]
    MissingDependency(String),
}

impl TranscodeError {
    pub fn probe(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Probe {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conversion(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        Self::Conversion {
            source_path: source.into(),
            target_path: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a failed profile evaluation
#[derive(thiserror::Error, Debug)]
pub enum EvaluateError {
    /// Source already satisfies the profile; nothing to do
    #[error("skip")]
    Skip,

    /// Source fails a quality rule
    #[error("rejected: {0}")]
    Reject(String),

    #[error(transparent)]
    Error(#[from] TranscodeError),
}

impl EvaluateError {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject(_))
    }
}

pub type Result<T, E = TranscodeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_carries_paths() {
        let err = TranscodeError::conversion("/in/a.mkv", "/out/a.hevc.mkv", "exit status 1");
        let msg = err.to_string();
        assert!(msg.contains("/in/a.mkv"));
        assert!(msg.contains("/out/a.hevc.mkv"));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_evaluate_error_kinds() {
        assert!(EvaluateError::Skip.is_skip());
        assert!(EvaluateError::Reject("bitrate too low".into()).is_reject());

        let err: EvaluateError = TranscodeError::UnknownCodec("mpeg2".into()).into();
        assert!(!err.is_skip());
        assert!(!err.is_reject());
        assert_eq!(err.to_string(), "unsupported codec: mpeg2");
    }
}
