//! # Work Item Module
//!
//! Elementi di lavoro e la loro macchina a stati.
//!
//! ```text
//! Waiting → Inspecting → {Skipped | Rejected | Inspected | Failed}
//! Inspected → Converting → {Converted | Failed | Skipped}
//! ```
//!
//! ## Regole di transizione:
//! - Ogni elemento non `Converting` può essere forzato a `Converting` dalla coda manuale
//! - Il percorso automatico prende solo elementi `Inspected`
//! - Gli esiti dell'ispezione valgono solo da `Inspecting`: un checkout manuale
//!   arrivato durante il probe non viene sovrascritto
//! - Gli esiti della conversione valgono solo da `Converting`

use super::progress::{Progress, ProgressSnapshot};
use crate::error::{Result, TranscodeError};
use crate::stats::VideoStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Position of a [`WorkItem`] in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Inspecting,
    Skipped,
    Rejected,
    Inspected,
    Converting,
    Converted,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Inspecting => "inspecting",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
            Self::Inspected => "inspected",
            Self::Converting => "converting",
            Self::Converted => "converted",
            Self::Failed => "failed",
        }
    }

    /// End states of the automatic path
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Rejected | Self::Converted | Self::Failed
        )
    }

    /// States that carry an error message
    fn has_error(&self) -> bool {
        matches!(self, Self::Skipped | Self::Rejected | Self::Failed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an item is claimed for conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Checkout {
    Automatic,
    Manual,
}

#[derive(Debug)]
struct ItemState {
    status: Status,
    err: Option<String>,
    source_stats: Option<VideoStats>,
    target_stats: Option<VideoStats>,
    target: Option<PathBuf>,
}

/// One file's tracked state through scan, inspect and convert
#[derive(Debug)]
pub struct WorkItem {
    source: PathBuf,
    state: Mutex<ItemState>,
    progress: Progress,
}

/// Point-in-time copy of a [`WorkItem`] for reporting
#[derive(Debug, Clone, Serialize)]
pub struct WorkItemSnapshot {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub status: Status,
    pub err: Option<String>,
    pub source_stats: Option<VideoStats>,
    pub target_stats: Option<VideoStats>,
    pub progress: ProgressSnapshot,
}

impl WorkItem {
    pub(crate) fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            state: Mutex::new(ItemState {
                status: Status::Waiting,
                err: None,
                source_stats: None,
                target_stats: None,
                target: None,
            }),
            progress: Progress::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn status(&self) -> Status {
        self.state().status
    }

    pub fn err(&self) -> Option<String> {
        self.state().err.clone()
    }

    pub fn source_stats(&self) -> Option<VideoStats> {
        self.state().source_stats.clone()
    }

    pub fn target_stats(&self) -> Option<VideoStats> {
        self.state().target_stats.clone()
    }

    /// Path of the conversion target, once one has been chosen
    pub fn target(&self) -> Option<PathBuf> {
        self.state().target.clone()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn transition(
        &self,
        allowed: &[Status],
        to: Status,
        err: Option<String>,
    ) -> Result<MutexGuard<'_, ItemState>> {
        let mut state = self.state();
        if !allowed.contains(&state.status) {
            return Err(TranscodeError::Validation(format!(
                "illegal transition {} -> {} for {}",
                state.status,
                to,
                self.source.display()
            )));
        }
        state.status = to;
        state.err = if to.has_error() {
            Some(err.unwrap_or_else(|| to.to_string()))
        } else {
            None
        };
        Ok(state)
    }

    pub fn set_inspecting(&self) -> Result<()> {
        self.transition(&[Status::Waiting], Status::Inspecting, None)
            .map(drop)
    }

    fn record_source_stats(&self, during: Status, stats: VideoStats) -> Result<()> {
        let mut state = self.state();
        if state.status != during {
            return Err(TranscodeError::Validation(format!(
                "source stats recorded while {} for {}",
                state.status,
                self.source.display()
            )));
        }
        self.progress.set_duration(stats.duration);
        state.source_stats = Some(stats);
        Ok(())
    }

    // Inspection outcomes. These only apply while `Inspecting`, so a manual
    // checkout that lands during the probe keeps its `Converting` status.

    /// Record probe results of the inspection
    pub fn set_probed(&self, stats: VideoStats) -> Result<()> {
        self.record_source_stats(Status::Inspecting, stats)
    }

    pub fn set_inspected(&self, target_stats: VideoStats) -> Result<()> {
        let mut state = self.transition(&[Status::Inspecting], Status::Inspected, None)?;
        state.target_stats = Some(target_stats);
        Ok(())
    }

    pub fn set_rejected(&self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[Status::Inspecting], Status::Rejected, Some(reason.into()))
            .map(drop)
    }

    pub fn set_inspection_skipped(&self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[Status::Inspecting], Status::Skipped, Some(reason.into()))
            .map(drop)
    }

    pub fn set_inspection_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[Status::Inspecting], Status::Failed, Some(reason.into()))
            .map(drop)
    }

    // Conversion outcomes, valid only while `Converting`.

    /// Record probe results of an item forced before inspection
    pub fn set_source_stats(&self, stats: VideoStats) -> Result<()> {
        self.record_source_stats(Status::Converting, stats)
    }

    pub fn set_skipped(&self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[Status::Converting], Status::Skipped, Some(reason.into()))
            .map(drop)
    }

    pub fn set_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.transition(&[Status::Converting], Status::Failed, Some(reason.into()))
            .map(drop)
    }

    pub fn set_converted(&self) -> Result<()> {
        self.transition(&[Status::Converting], Status::Converted, None)
            .map(drop)
    }

    /// Fill in target parameters for an item forced into conversion
    pub fn set_target_stats(&self, target_stats: VideoStats) {
        self.state().target_stats = Some(target_stats);
    }

    pub fn set_target(&self, target: impl Into<PathBuf>) {
        self.state().target = Some(target.into());
    }

    /// Claim the item for conversion; only the queue calls this, under its lock
    pub(crate) fn begin_conversion(&self, checkout: Checkout) -> Result<()> {
        const MANUAL: &[Status] = &[
            Status::Waiting,
            Status::Inspecting,
            Status::Skipped,
            Status::Rejected,
            Status::Inspected,
            Status::Converted,
            Status::Failed,
        ];
        let allowed: &[Status] = match checkout {
            Checkout::Automatic => &[Status::Inspected],
            Checkout::Manual => MANUAL,
        };
        self.transition(allowed, Status::Converting, None)?;
        self.progress.reset();
        Ok(())
    }

    pub fn snapshot(&self) -> WorkItemSnapshot {
        let state = self.state();
        WorkItemSnapshot {
            source: self.source.clone(),
            target: state.target.clone(),
            status: state.status,
            err: state.err.clone(),
            source_stats: state.source_stats.clone(),
            target_stats: state.target_stats.clone(),
            progress: self.progress.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats() -> VideoStats {
        VideoStats {
            video_codec: "h264".into(),
            bit_rate: 4_000_000,
            bits_per_sample: 8,
            height: 720,
            width: 1280,
            duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_automatic_path() {
        let item = WorkItem::new("/media/a.mkv");
        assert_eq!(item.status(), Status::Waiting);

        item.set_inspecting().unwrap();
        item.set_probed(stats()).unwrap();
        assert_eq!(item.progress().duration(), Duration::from_secs(60));

        item.set_inspected(stats()).unwrap();
        assert_eq!(item.status(), Status::Inspected);
        assert!(item.err().is_none());

        item.begin_conversion(Checkout::Automatic).unwrap();
        item.set_converted().unwrap();
        assert_eq!(item.status(), Status::Converted);
        assert!(item.status().is_terminal());
    }

    #[test]
    fn test_source_stats_only_while_probing() {
        let item = WorkItem::new("/media/a.mkv");
        assert!(item.set_probed(stats()).is_err());
        assert!(item.set_source_stats(stats()).is_err());
        item.begin_conversion(Checkout::Manual).unwrap();
        assert!(item.set_probed(stats()).is_err());
        item.set_source_stats(stats()).unwrap();
        assert_eq!(item.source_stats(), Some(stats()));
    }

    #[test]
    fn test_inspection_outcomes_leave_checked_out_item_alone() {
        let item = WorkItem::new("/media/a.mkv");
        item.set_inspecting().unwrap();
        item.begin_conversion(Checkout::Manual).unwrap();

        assert!(item.set_probed(stats()).is_err());
        assert!(item.set_inspected(stats()).is_err());
        assert!(item.set_rejected("bitrate too low").is_err());
        assert!(item.set_inspection_skipped("already hevc").is_err());
        assert!(item.set_inspection_failed("unreadable").is_err());
        assert_eq!(item.status(), Status::Converting);
        assert!(item.err().is_none());

        item.set_converted().unwrap();
        assert_eq!(item.status(), Status::Converted);
    }

    #[test]
    fn test_conversion_outcomes_need_converting() {
        let item = WorkItem::new("/media/a.mkv");
        item.set_inspecting().unwrap();
        assert!(item.set_skipped("target is newer than source").is_err());
        assert!(item.set_failed("encoder exited").is_err());
        assert_eq!(item.status(), Status::Inspecting);
    }

    #[test]
    fn test_cannot_skip_inspecting() {
        let item = WorkItem::new("/media/a.mkv");
        assert!(item.set_inspected(stats()).is_err());
        assert!(item.begin_conversion(Checkout::Automatic).is_err());
        assert!(item.set_converted().is_err());
        assert_eq!(item.status(), Status::Waiting);
    }

    #[test]
    fn test_err_set_only_for_error_states() {
        let item = WorkItem::new("/media/a.mkv");
        item.set_inspecting().unwrap();
        item.set_rejected("bitrate too low").unwrap();
        assert_eq!(item.err().as_deref(), Some("bitrate too low"));

        item.begin_conversion(Checkout::Manual).unwrap();
        assert_eq!(item.status(), Status::Converting);
        assert!(item.err().is_none());

        item.set_failed("encoder exited").unwrap();
        assert_eq!(item.err().as_deref(), Some("encoder exited"));
    }

    #[test]
    fn test_manual_checkout_refuses_converting() {
        let item = WorkItem::new("/media/a.mkv");
        item.begin_conversion(Checkout::Manual).unwrap();
        assert!(item.begin_conversion(Checkout::Manual).is_err());
        assert!(item.begin_conversion(Checkout::Automatic).is_err());
    }

    #[test]
    fn test_snapshot_serializes_status() {
        let item = WorkItem::new("/media/a.mkv");
        item.set_target("/media/a.hevc.mkv");
        let json = serde_json::to_value(item.snapshot()).unwrap();
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["target"], "/media/a.hevc.mkv");
        assert_eq!(json["progress"]["remaining_secs"], -1.0);
    }
}
