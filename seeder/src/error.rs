//! Error types for the seeder.
//!
//! Each module defines its own error enum; [`SeederError`] wraps the ones a
//! push can fail with.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::uploader::UploadError;

/// Errors that can occur during seeder operations.
#[derive(Error, Debug)]
pub enum SeederError {
    /// Persisting the pushed-files ledger failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Authorize or upload request failed.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

/// A specialized `Result` type for seeder operations.
pub type Result<T> = std::result::Result<T, SeederError>;
