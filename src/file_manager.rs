//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file attorno a una conversione.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei video filtrati per estensione
//! - Controllo "già convertito" tramite [`FileChecker`]
//! - Rimozione best-effort di target parziali e sorgenti convertite
//! - Dimensioni leggibili e percentuali di riduzione per i report
//!
//! ## Operazioni sui file:
//! - `media_files()`: Iteratore lazy sui video di una directory, senza seguire symlink
//! - `is_supported_format()`: Confronto case-insensitive con l'allow-list
//! - `get_file_info()`: Dimensione e modification time
//! - `remove_file()`: Rimozione che tratta "già assente" come successo
//!
//! ## Utilità:
//! - `format_size()`: Converte bytes in formato leggibile (KB, MB, GB)
//! - `calculate_reduction()`: Calcola percentuale di riduzione

use crate::error::{Result, TranscodeError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use walkdir::WalkDir;

/// Decides whether an earlier conversion can be reused
pub trait FileChecker: Send + Sync {
    /// True when `target` exists and was modified after `source`
    fn target_is_newer(&self, source: &Path, target: &Path) -> Result<bool>;
}

/// [`FileChecker`] comparing modification times on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileChecker;

impl FileChecker for FsFileChecker {
    fn target_is_newer(&self, source: &Path, target: &Path) -> Result<bool> {
        let target_modified = match std::fs::metadata(target) {
            Ok(metadata) => modified(target, &metadata)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(TranscodeError::filesystem(target, e)),
        };
        let source_metadata =
            std::fs::metadata(source).map_err(|e| TranscodeError::filesystem(source, e))?;
        Ok(target_modified > modified(source, &source_metadata)?)
    }
}

fn modified(path: &Path, metadata: &std::fs::Metadata) -> Result<SystemTime> {
    metadata
        .modified()
        .map_err(|e| TranscodeError::filesystem(path, e))
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Size in bytes and modification time of a file
    pub async fn get_file_info(path: &Path) -> Result<(u64, SystemTime)> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| TranscodeError::filesystem(path, e))?;
        Ok((metadata.len(), modified(path, &metadata)?))
    }

    /// Lazily walk `root`, yielding regular files whose extension is allowed.
    ///
    /// Symlinks are not followed. Entries that cannot be read are yielded as
    /// errors so the caller decides whether to continue.
    pub fn media_files<'a>(
        root: &Path,
        extensions: &'a [String],
    ) -> impl Iterator<Item = walkdir::Result<PathBuf>> + 'a {
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    Self::is_supported_format(entry.path(), extensions)
                        .then(|| Ok(entry.into_path()))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
    }

    /// Case-insensitive extension match against the allow-list
    pub fn is_supported_format(path: &Path, extensions: &[String]) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy();
                extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            }
            None => false,
        }
    }

    /// Remove a file, treating "already gone" as success
    pub async fn remove_file(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TranscodeError::filesystem(path, e)),
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
