//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce il feedback da terminale e le statistiche finali di una run.
//!
//! ## Componenti principali:
//! - [`ProgressManager`]: Barra `indicatif` su file sistemati / scoperti, con le
//!   conversioni in corso come messaggio
//! - [`ConversionTotals`]: Contatori di byte condivisi dai converter
//! - [`RunSummary`]: Conteggi per stato e byte risparmiati, stampati alla fine
//!
//! ## Statistiche tracciate:
//! - **discovered**: File trovati dallo scanner
//! - **converted** / **skipped** / **rejected** / **failed**: File per stato finale
//! - **unfinished**: File non sistemati alla fine della run
//! - **bytes_before** / **bytes_after**: Dimensioni di sorgenti e target convertiti
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [=========>------------------------------] 12/48 (25%) movie.mkv 42% 1.8x ETA 3m05s
//! ```

use crate::file_manager::FileManager;
use crate::queue::{QueueSnapshot, Status};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Manages the terminal progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        // the template is a literal, parsing only fails on a typo
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Refresh from a queue snapshot
    pub fn update(&self, snapshot: &QueueSnapshot) {
        let settled = snapshot
            .items
            .iter()
            .filter(|item| item.status.is_terminal())
            .count();
        self.bar.set_length(snapshot.size as u64);
        self.bar.set_position(settled as u64);
        self.bar.set_message(Self::converting_message(snapshot));
    }

    fn converting_message(snapshot: &QueueSnapshot) -> String {
        snapshot
            .items
            .iter()
            .filter(|item| item.status == Status::Converting)
            .map(|item| {
                let name = item
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let progress = &item.progress;
                let eta = if progress.remaining_secs < 0.0 {
                    "--".to_string()
                } else {
                    format_eta(Duration::from_secs_f64(progress.remaining_secs))
                };
                format!(
                    "{} {:.0}% {:.1}x ETA {}",
                    name,
                    progress.completed * 100.0,
                    progress.speed,
                    eta
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Print a line above the bar
    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m{:02}s", m, s),
        (h, m, _) => format!("{}h{:02}m", h, m),
    }
}

/// Sizes of converted sources and their targets
#[derive(Debug, Default)]
pub struct ConversionTotals {
    bytes_before: AtomicU64,
    bytes_after: AtomicU64,
}

impl ConversionTotals {
    pub fn add(&self, source_size: u64, target_size: u64) {
        self.bytes_before.fetch_add(source_size, Ordering::Relaxed);
        self.bytes_after.fetch_add(target_size, Ordering::Relaxed);
    }

    pub fn bytes_before(&self) -> u64 {
        self.bytes_before.load(Ordering::Relaxed)
    }

    pub fn bytes_after(&self) -> u64 {
        self.bytes_after.load(Ordering::Relaxed)
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub converted: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Items left before a final state, e.g. after cancellation
    pub unfinished: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub duration_seconds: f64,
}

impl RunSummary {
    pub fn new(snapshot: &QueueSnapshot, totals: &ConversionTotals, elapsed: Duration) -> Self {
        let converted = snapshot.count(Status::Converted);
        let skipped = snapshot.count(Status::Skipped);
        let rejected = snapshot.count(Status::Rejected);
        let failed = snapshot.count(Status::Failed);
        Self {
            discovered: snapshot.size,
            converted,
            skipped,
            rejected,
            failed,
            unfinished: snapshot.size - converted - skipped - rejected - failed,
            bytes_before: totals.bytes_before(),
            bytes_after: totals.bytes_after(),
            duration_seconds: elapsed.as_secs_f64(),
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes_before, self.bytes_after).max(0.0)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Discovered: {} files | Converted: {} | Skipped: {} | Rejected: {} | Failed: {} | Unfinished: {} | Total saved: {} ({:.2}%)",
            self.discovered,
            self.converted,
            self.skipped,
            self.rejected,
            self.failed,
            self.unfinished,
            FileManager::format_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Queue;

    fn snapshot() -> QueueSnapshot {
        let queue = Queue::new(false);
        let converted = queue.add("/m/a.mkv");
        queue.queue(&converted);
        queue.next_to_convert().unwrap();
        converted.set_converted().unwrap();

        let rejected = queue.add("/m/b.mkv");
        rejected.set_inspecting().unwrap();
        rejected.set_rejected("bitrate too low").unwrap();

        queue.add("/m/c.mkv");
        queue.snapshot()
    }

    #[test]
    fn test_summary_counts() {
        let totals = ConversionTotals::default();
        totals.add(1000, 400);
        let summary = RunSummary::new(&snapshot(), &totals, Duration::from_secs(3));

        assert_eq!(summary.discovered, 3);
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.unfinished, 1);
        assert_eq!(summary.bytes_saved(), 600);
        assert_eq!(summary.overall_reduction_percent(), 60.0);
        assert!(summary.format_summary().contains("Converted: 1"));
    }

    #[test]
    fn test_growth_is_not_negative_saving() {
        let totals = ConversionTotals::default();
        totals.add(100, 150);
        let summary = RunSummary::new(&snapshot(), &totals, Duration::ZERO);
        assert_eq!(summary.bytes_saved(), 0);
        assert_eq!(summary.overall_reduction_percent(), 0.0);
    }

    #[test]
    fn test_converting_message() {
        let queue = Queue::new(false);
        let item = queue.add("/m/movie.mkv");
        queue.queue(&item);
        queue.next_to_convert().unwrap();

        let message = ProgressManager::converting_message(&queue.snapshot());
        assert_eq!(message, "movie.mkv 0% 0.0x ETA --");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(Duration::from_secs(42)), "42s");
        assert_eq!(format_eta(Duration::from_secs(185)), "3m05s");
        assert_eq!(format_eta(Duration::from_secs(7260)), "2h01m");
    }

    #[test]
    fn test_hidden_manager_accepts_updates() {
        let manager = ProgressManager {
            bar: ProgressBar::hidden(),
        };
        manager.update(&snapshot());
        manager.finish("done");
    }
}
