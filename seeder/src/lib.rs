//! dat-seeder - pushes DataLayer `.dat` files to an object store.
//!
//! This crate watches a directory for `.dat` files and uploads each one once,
//! using a presigned post obtained from a control server. A ledger file in the
//! watched directory records what has been pushed so restarts do not upload
//! the same file again.
//!
//! # Pipeline
//!
//! ```text
//! scan / watcher ──▶ WorkQueue ──(one at a time, throttled)──▶ filter ──▶ authorize ──▶ upload ──▶ ledger
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for seeder operations
//! - [`filter`]: Upload eligibility for candidate paths
//! - [`ledger`]: Durable record of pushed files
//! - [`monitor`]: Orchestrator and credential-gated lifecycle
//! - [`pipeline`]: Per-file push pipeline
//! - [`queue`]: Throttled FIFO work queue
//! - [`types`]: Credentials, wire types, monitor state
//! - [`uploader`]: Two-phase authorize/upload HTTP client
//! - [`watcher`]: Directory scan and live file notifications

pub mod config;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod monitor;
pub mod pipeline;
pub mod queue;
pub mod types;
pub mod uploader;
pub mod watcher;

pub use config::Config;
pub use error::{Result, SeederError};
pub use filter::{Eligibility, SkipReason};
pub use ledger::{Ledger, LedgerError};
pub use monitor::{Monitor, MonitorConfig};
pub use pipeline::{PushOutcome, Pusher};
pub use queue::{ProcessFile, WorkQueue};
pub use types::{Credentials, MonitorState, PresignedPost};
pub use uploader::{UploadClient, UploadError};
pub use watcher::{DirWatcher, WatcherError};
