//! # Work Queue Module
//!
//! Contenitore concorrente di ogni [`WorkItem`] più la logica di dispatch verso
//! i converter.
//!
//! ## Dispatch:
//! - **Manuale**: gli elementi inviati con [`Queue::queue`] attendono in una FIFO
//!   e sono sempre serviti per primi, che la coda sia attiva o no
//! - **Automatico**: finché [`Queue::active`] è vero, viene preso il primo
//!   elemento `Inspected` in ordine di scoperta
//!
//! ## Concorrenza:
//! - Checkout e transizione a `Converting` avvengono sotto il mutex della coda,
//!   quindi due converter non ricevono mai lo stesso elemento
//! - Ogni elemento protegge il proprio stato con un lock separato
//! - Il lock della coda non è mai tenuto durante l'I/O
//!
//! ## Esempio:
//! ```rust
//! use video_transcoder::queue::{Queue, Status};
//!
//! let queue = Queue::new(false);
//! let item = queue.add("/media/movie.mkv");
//! queue.queue(&item);
//! let next = queue.next_to_convert().unwrap();
//! assert_eq!(next.status(), Status::Converting);
//! ```

mod item;
mod progress;

pub use item::{Status, WorkItem, WorkItemSnapshot};
pub use progress::{Progress, ProgressSnapshot, ProgressUpdate};

use item::Checkout;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct QueueInner {
    items: Vec<Arc<WorkItem>>,
    manual: VecDeque<Arc<WorkItem>>,
    active: bool,
}

/// Ordered list of all work items with manual and automatic dispatch
#[derive(Debug, Default)]
pub struct Queue {
    inner: Mutex<QueueInner>,
}

/// Read-only view of the queue for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub size: usize,
    pub active: bool,
    pub manual_pending: usize,
    pub items: Vec<WorkItemSnapshot>,
}

impl QueueSnapshot {
    pub fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

impl Queue {
    pub fn new(active: bool) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                active,
                ..Default::default()
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new `Waiting` item for `path`
    pub fn add(&self, path: impl Into<PathBuf>) -> Arc<WorkItem> {
        let item = Arc::new(WorkItem::new(path));
        self.inner().items.push(Arc::clone(&item));
        item
    }

    /// Submit an item for manual conversion.
    ///
    /// Returns `false` when the item is already waiting in the manual FIFO or
    /// is being converted right now.
    pub fn queue(&self, item: &Arc<WorkItem>) -> bool {
        let mut inner = self.inner();
        if inner.manual.iter().any(|queued| Arc::ptr_eq(queued, item)) {
            debug!(path = %item.source().display(), "already queued");
            return false;
        }
        if item.status() == Status::Converting {
            debug!(path = %item.source().display(), "already converting");
            return false;
        }
        inner.manual.push_back(Arc::clone(item));
        true
    }

    /// Check out the next item to convert, transitioning it to `Converting`
    pub fn next_to_convert(&self) -> Option<Arc<WorkItem>> {
        let mut inner = self.inner();

        while let Some(item) = inner.manual.pop_front() {
            match item.begin_conversion(Checkout::Manual) {
                Ok(()) => return Some(item),
                Err(e) => warn!("dropping manual request: {}", e),
            }
        }

        if !inner.active {
            return None;
        }

        inner
            .items
            .iter()
            .find(|item| item.begin_conversion(Checkout::Automatic).is_ok())
            .cloned()
    }

    pub fn set_active(&self, active: bool) {
        self.inner().active = active;
    }

    /// Flip automatic dispatch, returning the new value
    pub fn toggle_active(&self) -> bool {
        let mut inner = self.inner();
        inner.active = !inner.active;
        inner.active
    }

    pub fn active(&self) -> bool {
        self.inner().active
    }

    pub fn len(&self) -> usize {
        self.inner().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().items.is_empty()
    }

    pub fn manual_pending(&self) -> usize {
        self.inner().manual.len()
    }

    /// Clone of the item list in insertion order
    pub fn list(&self) -> Vec<Arc<WorkItem>> {
        self.inner().items.clone()
    }

    /// Find the item tracking `path`
    pub fn find(&self, path: &std::path::Path) -> Option<Arc<WorkItem>> {
        self.inner()
            .items
            .iter()
            .find(|item| item.source() == path)
            .cloned()
    }

    /// True when no item can make further progress on its own
    pub fn is_settled(&self) -> bool {
        let (items, manual) = {
            let inner = self.inner();
            (inner.items.clone(), inner.manual.len())
        };
        let active = self.active();
        manual == 0
            && items.iter().all(|item| match item.status() {
                Status::Inspected => !active,
                status => status.is_terminal(),
            })
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        // item locks are taken after the queue lock is released
        let (items, active, manual_pending) = {
            let inner = self.inner();
            (inner.items.clone(), inner.active, inner.manual.len())
        };
        QueueSnapshot {
            size: items.len(),
            active,
            manual_pending,
            items: items.iter().map(|item| item.snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::VideoStats;
    use std::collections::HashSet;
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

    fn inspected(queue: &Queue, path: &str) -> Arc<WorkItem> {
        let item = queue.add(path);
        item.set_inspecting().unwrap();
        item.set_inspected(stats()).unwrap();
        item
    }

    #[test]
    fn test_add_keeps_insertion_order() {
        let queue = Queue::new(true);
        queue.add("/a.mkv");
        queue.add("/b.mkv");
        let sources: Vec<_> = queue.list().iter().map(|i| i.source().to_path_buf()).collect();
        assert_eq!(sources, [PathBuf::from("/a.mkv"), PathBuf::from("/b.mkv")]);
        assert_eq!(queue.list()[0].status(), Status::Waiting);
    }

    #[test]
    fn test_inactive_queue_returns_nothing() {
        let queue = Queue::new(false);
        inspected(&queue, "/a.mkv");
        assert!(queue.next_to_convert().is_none());

        queue.set_active(true);
        assert!(queue.next_to_convert().is_some());
    }

    #[test]
    fn test_manual_bypasses_inactive_queue() {
        let queue = Queue::new(false);
        let item = queue.add("/a.mkv");
        assert!(queue.queue(&item));

        let next = queue.next_to_convert().unwrap();
        assert!(Arc::ptr_eq(&next, &item));
        assert_eq!(next.status(), Status::Converting);
        assert!(queue.next_to_convert().is_none());
    }

    #[test]
    fn test_manual_served_before_automatic() {
        let queue = Queue::new(true);
        let first = inspected(&queue, "/a.mkv");
        let second = inspected(&queue, "/b.mkv");
        let third = inspected(&queue, "/c.mkv");
        queue.queue(&third);
        queue.queue(&second);

        let order: Vec<_> = std::iter::from_fn(|| queue.next_to_convert()).collect();
        assert_eq!(order.len(), 3);
        assert!(Arc::ptr_eq(&order[0], &third));
        assert!(Arc::ptr_eq(&order[1], &second));
        assert!(Arc::ptr_eq(&order[2], &first));
    }

    #[test]
    fn test_manual_fifo_holds_item_once() {
        let queue = Queue::new(false);
        let item = queue.add("/a.mkv");
        assert!(queue.queue(&item));
        assert!(!queue.queue(&item));
        assert_eq!(queue.manual_pending(), 1);

        queue.next_to_convert().unwrap();
        // converting items cannot be queued again
        assert!(!queue.queue(&item));
        item.set_failed("boom").unwrap();
        assert!(queue.queue(&item));
    }

    #[test]
    fn test_automatic_skips_non_inspected() {
        let queue = Queue::new(true);
        queue.add("/waiting.mkv");
        let ready = inspected(&queue, "/ready.mkv");
        let next = queue.next_to_convert().unwrap();
        assert!(Arc::ptr_eq(&next, &ready));
        assert!(queue.next_to_convert().is_none());
    }

    #[test]
    fn test_toggle_active() {
        let queue = Queue::new(false);
        assert!(queue.toggle_active());
        assert!(queue.active());
        assert!(!queue.toggle_active());
    }

    #[test]
    fn test_concurrent_checkout_at_most_once() {
        let queue = Arc::new(Queue::new(true));
        for i in 0..200 {
            inspected(&queue, &format!("/media/{i}.mkv"));
        }
        // a few manual requests for items that are also eligible automatically
        for item in queue.list().iter().step_by(7) {
            queue.queue(item);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(item) = queue.next_to_convert() {
                        claimed.push(item.source().to_path_buf());
                    }
                    claimed
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for path in handle.join().unwrap() {
                total += 1;
                assert!(seen.insert(path), "item checked out twice");
            }
        }
        assert_eq!(total, 200);
        assert!(queue.list().iter().all(|i| i.status() == Status::Converting));
    }

    #[test]
    fn test_snapshot_and_settled() {
        let queue = Queue::new(true);
        let item = inspected(&queue, "/a.mkv");
        assert!(!queue.is_settled());

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.size, 1);
        assert!(snapshot.active);
        assert_eq!(snapshot.count(Status::Inspected), 1);

        queue.next_to_convert().unwrap();
        item.set_converted().unwrap();
        assert!(queue.is_settled());
        assert!(queue.find(std::path::Path::new("/a.mkv")).is_some());
    }
}
