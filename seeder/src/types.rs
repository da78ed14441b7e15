//! Shared types for the seeder.
//!
//! This module defines the credential pair used for basic auth against the
//! control server, the wire types for the authorize call, and the monitor
//! lifecycle state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Basic-auth credentials for the control server.
///
/// The password is wiped from memory when the value is dropped and is never
/// included in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Creates a new credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of the authorize request sent to the control server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeRequest<'a> {
    /// Store identifier derived from the filename prefix.
    pub store_id: &'a str,
    /// Base name of the file to upload.
    pub filename: &'a str,
}

/// Response from the control server's authorize endpoint.
///
/// A missing or `null` `presignedPost` means the server declined to authorize
/// the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizeResponse {
    #[serde(rename = "presignedPost", default)]
    pub presigned_post: Option<PresignedPost>,
}

/// A server-issued authorization for a single direct upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresignedPost {
    /// Target URL for the multipart upload.
    pub url: String,

    /// Form fields that must accompany the file.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Lifecycle state of a [`Monitor`](crate::monitor::Monitor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Constructed; `start` has not been called.
    Idle,
    /// Started, but no credentials have been provided yet.
    AwaitingCredentials,
    /// Credentials present; the directory is being watched and drained.
    Monitoring,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingCredentials => write!(f, "awaiting credentials"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}
