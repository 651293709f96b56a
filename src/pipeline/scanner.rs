//! # Scanner Module
//!
//! Scansione della directory che alimenta gli inspector.
//! Il walk gira su un thread bloccante e si ferma quando gli inspector chiudono il canale.

use crate::error::{Result, TranscodeError};
use crate::file_manager::FileManager;
use crate::queue::{Queue, WorkItem};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct Scanner {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    /// Paths already tracked by the queue
    pub known: HashSet<PathBuf>,
}

impl Scanner {
    /// Percorre l'albero, aggiunge ogni file alla coda e lo passa agli
    /// inspector. L'invio si blocca finché tutti gli inspector sono occupati.
    ///
    /// Ritorna il numero di file aggiunti.
    pub async fn run(
        self,
        queue: Arc<Queue>,
        tx: mpsc::Sender<Arc<WorkItem>>,
        cancel: CancellationToken,
    ) -> Result<usize> {
        if !self.root.is_dir() {
            return Err(TranscodeError::filesystem(
                &self.root,
                io::Error::new(io::ErrorKind::NotFound, "scan root is not a directory"),
            ));
        }
        info!(root = %self.root.display(), "scanning");

        let found = tokio::task::spawn_blocking(move || {
            let mut found = 0;
            for entry in FileManager::media_files(&self.root, &self.extensions) {
                if cancel.is_cancelled() {
                    debug!("scan cancelled");
                    break;
                }
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if self.known.contains(&path) {
                    continue;
                }

                debug!(path = %path.display(), "found");
                let item = queue.add(path);
                found += 1;
                if tx.blocking_send(item).is_err() {
                    debug!("inspectors stopped, ending scan");
                    break;
                }
            }
            found
        })
        .await
        .map_err(|e| TranscodeError::Io(io::Error::other(e)))?;

        info!(found, "scan finished");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner(root: PathBuf) -> Scanner {
        Scanner {
            root,
            extensions: vec!["mkv".into()],
            known: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn test_scan_adds_and_sends() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("b.MKV"), b"").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"").unwrap();

        let queue = Arc::new(Queue::new(false));
        let (tx, mut rx) = mpsc::channel(1);
        let scan = tokio::spawn(scanner(dir.path().to_path_buf()).run(
            Arc::clone(&queue),
            tx,
            CancellationToken::new(),
        ));

        let mut received = Vec::new();
        while let Some(item) = rx.recv().await {
            received.push(item.source().to_path_buf());
        }
        assert_eq!(scan.await.unwrap().unwrap(), 2);
        assert_eq!(received.len(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_known_paths_are_not_rescanned() {
        let dir = TempDir::new().unwrap();
        let forced = dir.path().join("a.mkv");
        std::fs::write(&forced, b"").unwrap();
        std::fs::write(dir.path().join("b.mkv"), b"").unwrap();

        let mut scanner = scanner(dir.path().to_path_buf());
        scanner.known.insert(forced);
        let (tx, mut rx) = mpsc::channel(4);
        let found = scanner
            .run(Arc::new(Queue::new(false)), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(found, 1);
        assert!(rx.recv().await.unwrap().source().ends_with("b.mkv"));
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = scanner(dir.path().join("missing"))
            .run(Arc::new(Queue::new(false)), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Filesystem { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_early() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("{i}.mkv")), b"").unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel(8);
        let found = scanner(dir.path().to_path_buf())
            .run(Arc::new(Queue::new(false)), tx, cancel)
            .await
            .unwrap();
        assert_eq!(found, 0);
    }
}
