//! Directory monitor: wires the watcher, work queue, and push pipeline.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──▶ AwaitingCredentials ──credentials set──▶ Monitoring
//! ```
//!
//! Nothing is scanned or watched until credentials are present. Entering
//! `Monitoring` attaches the live watcher, then lists the directory once and
//! enqueues every entry. Events that arrive during the listing wait in the
//! watcher channel, so a file created in between is not missed. `Monitoring`
//! lasts until the monitor is dropped.
//!
//! Paths may be enqueued directly at any time; the drain worker runs from
//! construction. [`Monitor::start`] and [`Monitor::set_credentials`] may be
//! called from any thread, including ones outside the runtime.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use dat_seeder::monitor::{Monitor, MonitorConfig};
//! use dat_seeder::types::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> dat_seeder::Result<()> {
//!     let config = MonitorConfig::new(
//!         PathBuf::from("/data/server_files"),
//!         "https://seed.example.com/upload".to_string(),
//!     );
//!     let monitor = Monitor::new(config)?;
//!     let mut lengths = monitor.subscribe_queue_length();
//!
//!     monitor.set_credentials(Credentials::new("alice", "secret"));
//!
//!     while let Ok(len) = lengths.recv().await {
//!         println!("pending uploads: {len}");
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

use crate::config::{Config, DEFAULT_CREDENTIAL_POLL_SECS};
use crate::error::Result;
use crate::ledger::{Ledger, LEDGER_FILE_NAME, LEDGER_TMP_FILE_NAME};
use crate::pipeline::Pusher;
use crate::queue::{WorkQueue, DEFAULT_THROTTLE_MS};
use crate::types::{Credentials, MonitorState};
use crate::uploader::UploadClient;
use crate::watcher::{scan_directory, DirWatcher};

/// Settings for a [`Monitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory to watch; also holds the ledger file.
    pub watch_dir: PathBuf,

    /// Control-server authorize endpoint.
    pub server_url: String,

    /// Delay after each processed path.
    pub throttle: Duration,

    /// Upper bound on how long a credential wait goes without re-checking.
    pub credential_poll: Duration,

    /// Optional per-request HTTP timeout.
    pub request_timeout: Option<Duration>,
}

impl MonitorConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(watch_dir: PathBuf, server_url: String) -> Self {
        Self {
            watch_dir,
            server_url,
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            credential_poll: Duration::from_secs(DEFAULT_CREDENTIAL_POLL_SECS),
            request_timeout: None,
        }
    }

    /// Sets the throttle delay.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the credential re-check interval.
    #[must_use]
    pub fn with_credential_poll(mut self, credential_poll: Duration) -> Self {
        self.credential_poll = credential_poll;
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Option<Duration>) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

impl From<&Config> for MonitorConfig {
    fn from(config: &Config) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            server_url: config.server_url.clone(),
            throttle: config.throttle,
            credential_poll: config.credential_poll,
            request_timeout: config.request_timeout,
        }
    }
}

/// State shared with the background tasks.
struct Inner {
    runtime: Handle,
    watch_dir: PathBuf,
    credential_poll: Duration,
    queue: Arc<WorkQueue>,
    pusher: Arc<Pusher>,
    credentials: watch::Sender<Option<Credentials>>,
    state: watch::Sender<MonitorState>,
    started: AtomicBool,
    watcher: Mutex<Option<DirWatcher>>,
}

/// Watches one directory and pushes its `.dat` files.
///
/// Dropping the monitor stops its background tasks.
pub struct Monitor {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Monitor {
    /// Creates a monitor in the `Idle` state and starts its drain worker.
    ///
    /// The ledger is loaded from the watch directory; a missing or corrupt
    /// ledger starts empty.
    ///
    /// Must be called from within a Tokio runtime; later background tasks
    /// are spawned on that same runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let runtime = Handle::current();
        let ledger = Ledger::load(&config.watch_dir);
        let client = UploadClient::new(config.server_url, config.request_timeout)?;

        let credentials = watch::Sender::new(None);
        let pusher = Arc::new(Pusher::new(ledger, client, credentials.subscribe()));
        let queue = Arc::new(WorkQueue::new(config.throttle));
        let worker = queue.spawn(Arc::clone(&pusher));

        info!(
            watch_dir = %config.watch_dir.display(),
            throttle_ms = config.throttle.as_millis(),
            "Monitor created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                runtime,
                watch_dir: config.watch_dir,
                credential_poll: config.credential_poll,
                queue,
                pusher,
                credentials,
                state: watch::Sender::new(MonitorState::Idle),
                started: AtomicBool::new(false),
                watcher: Mutex::new(None),
            }),
            tasks: Mutex::new(vec![worker]),
        })
    }

    /// Begins monitoring once credentials are available.
    ///
    /// Only the first call has an effect.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner
            .state
            .send_replace(MonitorState::AwaitingCredentials);

        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            if wait_for_credentials(&inner).await {
                begin_monitoring(&inner).await;
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Sets (or replaces) the basic-auth credentials and starts the monitor
    /// if it has not been started yet.
    pub fn set_credentials(&self, credentials: Credentials) {
        info!(username = %credentials.username(), "Credentials set");
        self.inner.credentials.send_replace(Some(credentials));
        self.start();
    }

    /// Returns `true` if credentials have been set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.inner.credentials.borrow().is_some()
    }

    /// Replaces the control-server endpoint for subsequent authorize calls.
    pub fn set_server_url(&self, server_url: String) {
        info!(server_url = %server_url, "Server URL changed");
        self.inner.pusher.client().set_server_url(server_url);
    }

    /// Adds a candidate path to the tail of the queue.
    pub fn enqueue(&self, path: PathBuf) {
        self.inner.queue.enqueue(path);
    }

    /// Number of paths waiting to be processed.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Subscribes to queue-length changes.
    #[must_use]
    pub fn subscribe_queue_length(&self) -> broadcast::Receiver<usize> {
        self.inner.queue.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.inner.state.borrow()
    }

    /// Subscribes to lifecycle state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.inner.state.subscribe()
    }

    /// Returns `true` if the ledger records `filename` as pushed.
    pub async fn is_pushed(&self, filename: &str) -> bool {
        self.inner.pusher.is_pushed(filename).await
    }

    /// Number of files recorded in the ledger.
    pub async fn pushed_count(&self) -> usize {
        self.inner.pusher.pushed_count().await
    }

    /// The watched directory.
    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.inner.watch_dir
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Waits until credentials are present, re-checking at least every poll
/// interval. Returns `false` if the credential channel closed.
async fn wait_for_credentials(inner: &Inner) -> bool {
    let mut rx = inner.credentials.subscribe();

    loop {
        if rx.borrow_and_update().is_some() {
            return true;
        }

        info!("Waiting for authentication credentials...");
        if let Ok(Err(_)) = timeout(inner.credential_poll, rx.changed()).await {
            return false;
        }
    }
}

async fn begin_monitoring(inner: &Inner) {
    // Attach first; events raised while listing queue up in the channel
    let (tx, mut rx) = mpsc::unbounded_channel();
    match DirWatcher::new(
        inner.watch_dir.clone(),
        &[LEDGER_FILE_NAME, LEDGER_TMP_FILE_NAME],
        tx,
    ) {
        Ok(watcher) => {
            *inner.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);
        }
        // `tx` is dropped with the error, so `rx` below ends right away
        Err(e) => {
            error!(watch_dir = %inner.watch_dir.display(), error = %e, "Failed to watch directory");
        }
    }

    inner.state.send_replace(MonitorState::Monitoring);
    info!(watch_dir = %inner.watch_dir.display(), "Monitoring started");

    match scan_directory(&inner.watch_dir) {
        Ok(paths) => {
            info!(count = paths.len(), "Queueing existing directory entries");
            for path in paths {
                inner.queue.enqueue(path);
            }
        }
        Err(e) => {
            error!(watch_dir = %inner.watch_dir.display(), error = %e, "Error reading directory");
        }
    }

    while let Some(path) = rx.recv().await {
        inner.queue.enqueue(path);
    }
}
