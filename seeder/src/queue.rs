//! Throttled FIFO work queue.
//!
//! Paths are appended with [`WorkQueue::enqueue`] and drained by a single
//! worker task, one at a time, with a fixed delay after each item completes.
//! Because there is exactly one worker, at most one file is ever in flight
//! and items are processed in enqueue order.
//!
//! # Queue length notifications
//!
//! Every enqueue and every completed item publishes the current number of
//! pending paths on a broadcast channel. Subscribers that fall behind see
//! `RecvError::Lagged` and should simply read on.
//!
//! # Example
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dat_seeder::filter::SkipReason;
//! use dat_seeder::pipeline::PushOutcome;
//! use dat_seeder::queue::{ProcessFile, WorkQueue};
//!
//! struct Print;
//!
//! impl ProcessFile for Print {
//!     async fn process(&self, path: &Path) -> PushOutcome {
//!         println!("{}", path.display());
//!         PushOutcome::Skipped(SkipReason::WrongExtension)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = Arc::new(WorkQueue::new(Duration::from_secs(1)));
//!     let mut lengths = queue.subscribe();
//!     let _worker = queue.spawn(Arc::new(Print));
//!
//!     queue.enqueue(PathBuf::from("/data/abc-1.dat"));
//!     while let Ok(len) = lengths.recv().await {
//!         println!("pending: {len}");
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::pipeline::PushOutcome;

/// Default delay between the completion of one item and the start of the next.
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Capacity of the queue-length broadcast channel.
pub const LENGTH_CHANNEL_CAPACITY: usize = 256;

/// Work performed for each dequeued path.
pub trait ProcessFile: Send + Sync + 'static {
    /// Processes one path to completion. Must not panic on failure; failures
    /// are reported through the outcome.
    fn process(&self, path: &Path) -> impl Future<Output = PushOutcome> + Send;
}

/// Unbounded FIFO of pending paths with a single throttled drain worker.
#[derive(Debug)]
pub struct WorkQueue {
    pending: Mutex<VecDeque<PathBuf>>,
    wake: Notify,
    length_tx: broadcast::Sender<usize>,
    throttle: Duration,
}

impl WorkQueue {
    /// Creates an empty queue that waits `throttle` after each item.
    #[must_use]
    pub fn new(throttle: Duration) -> Self {
        let (length_tx, _) = broadcast::channel(LENGTH_CHANNEL_CAPACITY);
        Self {
            pending: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            length_tx,
            throttle,
        }
    }

    /// Appends `path` to the tail and wakes the worker.
    ///
    /// Never blocks and never rejects.
    pub fn enqueue(&self, path: PathBuf) {
        {
            let mut pending = self.lock_pending();
            trace!(path = %path.display(), "Enqueued path");
            pending.push_back(path);
            self.publish_len(pending.len());
        }
        self.wake.notify_one();
    }

    /// Number of paths waiting to be processed. The item currently in flight
    /// is not counted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Returns `true` if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    /// Subscribes to queue-length changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<usize> {
        self.length_tx.subscribe()
    }

    /// Spawns the drain worker on the current Tokio runtime.
    ///
    /// Only one worker should run per queue; a second one would break the
    /// one-in-flight guarantee.
    pub fn spawn<P: ProcessFile>(self: &Arc<Self>, processor: Arc<P>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.run(processor).await })
    }

    /// Drains the queue forever, sleeping while it is empty.
    pub async fn run<P: ProcessFile>(&self, processor: Arc<P>) {
        loop {
            let next = self.lock_pending().pop_front();
            let Some(path) = next else {
                self.wake.notified().await;
                continue;
            };

            let outcome = processor.process(&path).await;
            debug!(path = %path.display(), ?outcome, "Processed path");

            self.publish_len(self.len());

            // Measured from completion, not from enqueue.
            sleep(self.throttle).await;
        }
    }

    fn publish_len(&self, len: usize) {
        // No receivers is fine.
        let _ = self.length_tx.send(len);
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<PathBuf>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
