//! Two-phase upload client.
//!
//! Uploading a file takes two requests:
//!
//! 1. **Authorize**: `POST` `{store_id, filename}` as JSON to the control
//!    server, with basic auth when credentials are set. The server answers
//!    with a presigned post (target URL plus form fields), or `null` when it
//!    declines.
//! 2. **Upload**: `POST` a multipart form to the presigned URL carrying every
//!    form field plus the file content, streamed from disk, in a part named
//!    `file`. This request is never authenticated.
//!
//! The client has no retry policy: every failure is returned to the caller.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use dat_seeder::types::Credentials;
//! use dat_seeder::uploader::UploadClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dat_seeder::uploader::UploadError> {
//!     let client = UploadClient::new("https://seed.example.com/upload".to_string(), None)?;
//!     let creds = Credentials::new("alice", "secret");
//!
//!     if let Some(post) = client.authorize("abc", "abc-1.dat", Some(&creds)).await? {
//!         client.upload(&post, Path::new("/data/abc-1.dat"), "abc-1.dat").await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use thiserror::Error;
use tokio::fs::File;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::types::{AuthorizeRequest, AuthorizeResponse, Credentials, PresignedPost};

/// Name of the multipart part carrying the file content.
pub const FILE_FIELD: &str = "file";

/// Which request of the protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authorize,
    Upload,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authorize => write!(f, "authorize"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// Errors that can occur while authorizing or uploading a file.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    /// The request could not be sent or the response body was unreadable.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote end answered with a non-success status.
    #[error("{phase} failed: {status} - {message}")]
    Status {
        phase: Phase,
        status: u16,
        message: String,
    },

    /// The file to upload could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// HTTP client for the authorize and upload calls.
#[derive(Debug)]
pub struct UploadClient {
    client: Client,
    server_url: watch::Sender<String>,
}

impl UploadClient {
    /// Creates a client that authorizes against `server_url`.
    ///
    /// `request_timeout` bounds each request; `None` leaves requests
    /// unbounded.
    ///
    /// # Errors
    ///
    /// Returns `UploadError::ClientInit` if the TLS backend cannot be set up.
    pub fn new(server_url: String, request_timeout: Option<Duration>) -> Result<Self, UploadError> {
        let mut builder = Client::builder().pool_max_idle_per_host(2);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(UploadError::ClientInit)?;

        Ok(Self {
            client,
            server_url: watch::Sender::new(server_url),
        })
    }

    /// Returns the current authorize endpoint.
    #[must_use]
    pub fn server_url(&self) -> String {
        self.server_url.borrow().clone()
    }

    /// Replaces the authorize endpoint for subsequent requests.
    pub fn set_server_url(&self, server_url: String) {
        self.server_url.send_replace(server_url);
    }

    /// Asks the control server for a presigned post.
    ///
    /// Returns `Ok(None)` when the server responds without an authorization.
    ///
    /// # Errors
    ///
    /// Returns `UploadError` on transport failure, a non-success status, or an
    /// unparsable response body.
    pub async fn authorize(
        &self,
        store_id: &str,
        filename: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<PresignedPost>, UploadError> {
        let url = self.server_url();
        debug!(url = %url, store_id, filename, "Requesting presigned post");

        let mut request = self
            .client
            .post(&url)
            .json(&AuthorizeRequest { store_id, filename });

        if let Some(creds) = credentials {
            request = request.basic_auth(creds.username(), Some(creds.password()));
        }

        let response = check_status(request.send().await?, Phase::Authorize).await?;
        let body: AuthorizeResponse = response.json().await?;

        Ok(body.presigned_post)
    }

    /// Uploads the file at `path` using a presigned post.
    ///
    /// # Errors
    ///
    /// Returns `UploadError` if the file cannot be read, the request fails, or
    /// the object store answers with a non-success status.
    pub async fn upload(
        &self,
        post: &PresignedPost,
        path: &Path,
        filename: &str,
    ) -> Result<(), UploadError> {
        let read_error = |source| UploadError::ReadFile {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).await.map_err(read_error)?;
        let size = file.metadata().await.map_err(read_error)?.len();

        debug!(
            url = %post.url,
            filename,
            size,
            fields = post.fields.len(),
            "Uploading file"
        );

        // Streamed from disk; DataLayer files can be large
        let content = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), size)
            .file_name(filename.to_string());

        let form = post
            .fields
            .iter()
            .fold(Form::new(), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            })
            .part(FILE_FIELD, content);

        let response = self.client.post(&post.url).multipart(form).send().await?;
        check_status(response, Phase::Upload).await?;

        Ok(())
    }
}

async fn check_status(response: Response, phase: Phase) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(UploadError::Status {
        phase,
        status: status.as_u16(),
        message,
    })
}
