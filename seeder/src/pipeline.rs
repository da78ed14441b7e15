//! Per-file push pipeline.
//!
//! [`Pusher`] runs one candidate path through the full pipeline: eligibility
//! check against the ledger, authorize, upload, and ledger record. Every
//! failure is contained here; the caller only sees a [`PushOutcome`].

use std::path::Path;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use crate::error::SeederError;
use crate::filter::{self, Eligibility, SkipReason};
use crate::ledger::Ledger;
use crate::queue::ProcessFile;
use crate::types::Credentials;
use crate::uploader::UploadClient;

/// What happened to a single candidate path.
#[derive(Debug)]
pub enum PushOutcome {
    /// Uploaded and recorded in the ledger.
    Pushed { filename: String },
    /// Not eligible; no network calls were made.
    Skipped(SkipReason),
    /// The control server returned no presigned post.
    Declined { filename: String },
    /// A request, file read, or ledger write failed. The file stays
    /// eligible for a later attempt.
    Failed {
        filename: String,
        error: SeederError,
    },
}

impl PushOutcome {
    /// Returns `true` if the file was uploaded and recorded.
    #[must_use]
    pub fn is_pushed(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}

/// Owns the ledger and upload client and pushes files one at a time.
#[derive(Debug)]
pub struct Pusher {
    ledger: Mutex<Ledger>,
    client: UploadClient,
    credentials: watch::Receiver<Option<Credentials>>,
}

impl Pusher {
    /// Creates a pusher. Credentials are read from `credentials` at the start
    /// of every authorize request.
    #[must_use]
    pub fn new(
        ledger: Ledger,
        client: UploadClient,
        credentials: watch::Receiver<Option<Credentials>>,
    ) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            client,
            credentials,
        }
    }

    /// Returns the upload client.
    #[must_use]
    pub fn client(&self) -> &UploadClient {
        &self.client
    }

    /// Returns `true` if the ledger records `filename`.
    pub async fn is_pushed(&self, filename: &str) -> bool {
        self.ledger.lock().await.is_pushed(filename)
    }

    /// Number of files recorded in the ledger.
    pub async fn pushed_count(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Runs `path` through the pipeline.
    pub async fn push(&self, path: &Path) -> PushOutcome {
        let eligibility = filter::check(path, &*self.ledger.lock().await);

        let (filename, store_id) = match eligibility {
            Eligibility::Eligible { filename, store_id } => (filename, store_id),
            Eligibility::Skip(reason) => {
                match reason {
                    SkipReason::AlreadyPushed => {
                        info!(path = %path.display(), "File already pushed")
                    }
                    _ => debug!(path = %path.display(), %reason, "Skipping file"),
                }
                return PushOutcome::Skipped(reason);
            }
        };

        match self.try_push(path, &filename, &store_id).await {
            Ok(true) => {
                info!(filename = %filename, "File pushed to object store");
                PushOutcome::Pushed { filename }
            }
            Ok(false) => {
                info!(filename = %filename, "No presigned post received");
                PushOutcome::Declined { filename }
            }
            Err(e) => {
                error!(filename = %filename, error = %e, "Error pushing file");
                PushOutcome::Failed { filename, error: e }
            }
        }
    }

    /// Returns `Ok(false)` when the server declines to authorize the file.
    async fn try_push(
        &self,
        path: &Path,
        filename: &str,
        store_id: &str,
    ) -> Result<bool, SeederError> {
        let credentials = self.credentials.borrow().clone();

        let Some(post) = self
            .client
            .authorize(store_id, filename, credentials.as_ref())
            .await?
        else {
            return Ok(false);
        };

        self.client.upload(&post, path, filename).await?;
        self.ledger.lock().await.record_pushed(filename)?;

        Ok(true)
    }
}

impl ProcessFile for Pusher {
    async fn process(&self, path: &Path) -> PushOutcome {
        self.push(path).await
    }
}
