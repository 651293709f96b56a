//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per i consumatori programmatici.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riusa gli snapshot della coda e il [`RunSummary`] finale
//! - Fornisce un'interfaccia stabile per la comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: Parametri della run
//! - `status`: Snapshot periodico con conteggi per stato e conversioni in corso
//! - `file_complete`: Un elemento ha raggiunto uno stato finale
//! - `complete`: [`RunSummary`] finale
//! - `error`: Errore fatale

use crate::config::Config;
use crate::queue::{QueueSnapshot, Status, WorkItemSnapshot};
use crate::report::RunSummary;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One JSON event
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        root: PathBuf,
        profile: String,
        inspectors: usize,
        converters: usize,
        active: bool,
        target_dir: Option<PathBuf>,
    },

    Status {
        size: usize,
        active: bool,
        manual_pending: usize,
        counts: BTreeMap<Status, usize>,
        converting: Vec<ConversionStatus>,
    },

    FileComplete {
        source: PathBuf,
        target: Option<PathBuf>,
        status: Status,
        error: Option<String>,
    },

    Complete {
        #[serde(flatten)]
        summary: RunSummary,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// A conversion in flight
#[derive(Debug, Serialize)]
pub struct ConversionStatus {
    pub source: PathBuf,
    pub target: Option<PathBuf>,
    pub completed: f64,
    pub speed: f64,
    /// -1.0 while unknown
    pub remaining_secs: f64,
}

impl JsonMessage {
    /// Write the event as one line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(root: PathBuf, config: &Config) -> Self {
        Self::Start {
            root,
            profile: config.profile.to_string(),
            inspectors: config.inspectors,
            converters: config.converters,
            active: config.active,
            target_dir: config.target_dir.clone(),
        }
    }

    pub fn status(snapshot: &QueueSnapshot) -> Self {
        let mut counts = BTreeMap::new();
        for item in &snapshot.items {
            *counts.entry(item.status).or_insert(0) += 1;
        }
        let converting = snapshot
            .items
            .iter()
            .filter(|item| item.status == Status::Converting)
            .map(|item| ConversionStatus {
                source: item.source.clone(),
                target: item.target.clone(),
                completed: item.progress.completed,
                speed: item.progress.speed,
                remaining_secs: item.progress.remaining_secs,
            })
            .collect();

        Self::Status {
            size: snapshot.size,
            active: snapshot.active,
            manual_pending: snapshot.manual_pending,
            counts,
            converting,
        }
    }

    pub fn file_complete(item: &WorkItemSnapshot) -> Self {
        Self::FileComplete {
            source: item.source.clone(),
            target: item.target.clone(),
            status: item.status,
            error: item.err.clone(),
        }
    }

    pub fn complete(summary: RunSummary) -> Self {
        Self::Complete { summary }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Queue;
    use serde_json::Value;

    #[test]
    fn test_messages_are_tagged() {
        let start = serde_json::to_value(JsonMessage::start("/media".into(), &Config::default())).unwrap();
        assert_eq!(start["type"], "start");
        assert_eq!(start["profile"], "hevc-low");

        let error = serde_json::to_value(JsonMessage::error("boom".into(), None)).unwrap();
        assert_eq!(error["type"], "error");
        assert_eq!(error["details"], Value::Null);
    }

    #[test]
    fn test_status_counts_and_conversions() {
        let queue = Queue::new(true);
        queue.add("/m/a.mkv");
        let converting = queue.add("/m/b.mkv");
        converting.set_target("/m/b.hevc.mkv");
        queue.queue(&converting);
        queue.next_to_convert().unwrap();

        let status = serde_json::to_value(JsonMessage::status(&queue.snapshot())).unwrap();
        assert_eq!(status["type"], "status");
        assert_eq!(status["size"], 2);
        assert_eq!(status["counts"]["waiting"], 1);
        assert_eq!(status["counts"]["converting"], 1);
        assert_eq!(status["converting"][0]["target"], "/m/b.hevc.mkv");
        assert_eq!(status["converting"][0]["remaining_secs"], -1.0);
    }

    #[test]
    fn test_complete_flattens_summary() {
        let summary = RunSummary {
            discovered: 5,
            converted: 2,
            ..Default::default()
        };
        let complete = serde_json::to_value(JsonMessage::complete(summary)).unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["discovered"], 5);
        assert_eq!(complete["converted"], 2);
    }

    #[test]
    fn test_file_complete() {
        let queue = Queue::new(false);
        let item = queue.add("/m/a.mkv");
        item.set_inspecting().unwrap();
        item.set_inspection_skipped("already hevc").unwrap();

        let message = serde_json::to_value(JsonMessage::file_complete(&item.snapshot())).unwrap();
        assert_eq!(message["type"], "file_complete");
        assert_eq!(message["status"], "skipped");
        assert_eq!(message["error"], "already hevc");
    }
}
