//! Configuration module for dat-seeder.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `SEEDER_SERVER_URL` | Yes | - | Control-server authorize endpoint |
//! | `SEEDER_WATCH_DIR` | No | `~/.chia/mainnet/data_layer/db/server_files_location_mainnet` | Directory to watch |
//! | `SEEDER_THROTTLE_MS` | No | 1000 | Delay between upload cycles |
//! | `SEEDER_CREDENTIAL_POLL_SECS` | No | 30 | Interval between credential checks (>= 1) |
//! | `SEEDER_REQUEST_TIMEOUT_SECS` | No | none | Per-request HTTP timeout (>= 1) |
//! | `SEEDER_USERNAME` | No | - | Basic-auth username (requires `SEEDER_PASSWORD`) |
//! | `SEEDER_PASSWORD` | No | - | Basic-auth password (requires `SEEDER_USERNAME`) |
//!
//! # Example
//!
//! ```no_run
//! use dat_seeder::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Server URL: {}", config.server_url);
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

use crate::queue::DEFAULT_THROTTLE_MS;
use crate::types::Credentials;

/// Default watch directory relative to home: the Chia DataLayer file store.
const DEFAULT_WATCH_DIR: &str = ".chia/mainnet/data_layer/db/server_files_location_mainnet";

/// Default interval between credential checks, in seconds.
pub const DEFAULT_CREDENTIAL_POLL_SECS: u64 = 30;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for dat-seeder.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control-server endpoint that issues presigned posts.
    pub server_url: String,

    /// Directory to watch for `.dat` files. Also holds the ledger.
    pub watch_dir: PathBuf,

    /// Minimum delay between the end of one upload cycle and the next.
    pub throttle: Duration,

    /// How often to re-check for credentials while waiting for them.
    pub credential_poll: Duration,

    /// Per-request HTTP timeout. `None` means requests are not bounded.
    pub request_timeout: Option<Duration>,

    /// Basic-auth credentials, if provided up front.
    pub credentials: Option<Credentials>,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `SEEDER_SERVER_URL` is not set
    /// - a numeric variable cannot be parsed or is out of range
    /// - only one of `SEEDER_USERNAME` / `SEEDER_PASSWORD` is set
    /// - `SEEDER_WATCH_DIR` is unset and the home directory cannot be determined
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: SEEDER_SERVER_URL
        let server_url = env::var("SEEDER_SERVER_URL")
            .map_err(|_| ConfigError::MissingEnvVar("SEEDER_SERVER_URL".to_string()))?;
        if server_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "SEEDER_SERVER_URL".to_string(),
                message: "server URL cannot be empty".to_string(),
            });
        }

        let watch_dir = watch_dir_from_env()?;

        // Optional: SEEDER_THROTTLE_MS (default: 1000, zero allowed)
        let throttle_ms = parse_u64("SEEDER_THROTTLE_MS", 0)?.unwrap_or(DEFAULT_THROTTLE_MS);

        // Optional: SEEDER_CREDENTIAL_POLL_SECS (default: 30, must be >= 1)
        let poll_secs =
            parse_u64("SEEDER_CREDENTIAL_POLL_SECS", 1)?.unwrap_or(DEFAULT_CREDENTIAL_POLL_SECS);

        // Optional: SEEDER_REQUEST_TIMEOUT_SECS (default: none, must be >= 1)
        let request_timeout =
            parse_u64("SEEDER_REQUEST_TIMEOUT_SECS", 1)?.map(Duration::from_secs);

        let credentials = match (env::var("SEEDER_USERNAME"), env::var("SEEDER_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(Credentials::new(username, password)),
            (Err(_), Err(_)) => None,
            (Ok(_), Err(_)) => return Err(ConfigError::MissingEnvVar("SEEDER_PASSWORD".to_string())),
            (Err(_), Ok(_)) => return Err(ConfigError::MissingEnvVar("SEEDER_USERNAME".to_string())),
        };

        Ok(Self {
            server_url,
            watch_dir,
            throttle: Duration::from_millis(throttle_ms),
            credential_poll: Duration::from_secs(poll_secs),
            request_timeout,
            credentials,
        })
    }
}

/// Resolves the watch directory: `SEEDER_WATCH_DIR`, or the Chia DataLayer
/// file store under the home directory.
///
/// # Errors
///
/// Returns `ConfigError::NoHomeDirectory` if the variable is unset and the
/// home directory cannot be determined.
pub fn watch_dir_from_env() -> Result<PathBuf, ConfigError> {
    match env::var("SEEDER_WATCH_DIR") {
        Ok(dir) => Ok(PathBuf::from(dir)),
        Err(_) => {
            let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
            Ok(base_dirs.home_dir().join(DEFAULT_WATCH_DIR))
        }
    }
}

/// Parses an optional integer variable that must be at least `min`.
fn parse_u64(key: &str, min: u64) -> Result<Option<u64>, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(None);
    };

    let parsed = val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected non-negative integer, got '{val}'"),
    })?;

    if parsed < min {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at least {min}, got {parsed}"),
        });
    }

    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all SEEDER_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("SEEDER_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("SEEDER_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_missing_server_url() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "SEEDER_SERVER_URL"));
        });
    }

    #[test]
    #[serial]
    fn test_empty_server_url_rejected() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "  ");
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SEEDER_SERVER_URL"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.server_url, "https://seed.example.com/upload");
            assert!(config.watch_dir.ends_with("server_files_location_mainnet"));
            assert_eq!(config.throttle, Duration::from_millis(1000));
            assert_eq!(config.credential_poll, Duration::from_secs(30));
            assert!(config.request_timeout.is_none());
            assert!(config.credentials.is_none());
        });
    }

    #[test]
    #[serial]
    fn test_watch_dir_without_server_url() {
        with_clean_env(|| {
            let dir = watch_dir_from_env().expect("default watch dir");
            assert!(dir.ends_with(DEFAULT_WATCH_DIR));

            env::set_var("SEEDER_WATCH_DIR", "/data/files");
            assert_eq!(watch_dir_from_env().unwrap(), PathBuf::from("/data/files"));
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_WATCH_DIR", "/data/files");
            env::set_var("SEEDER_THROTTLE_MS", "250");
            env::set_var("SEEDER_CREDENTIAL_POLL_SECS", "5");
            env::set_var("SEEDER_REQUEST_TIMEOUT_SECS", "60");
            env::set_var("SEEDER_USERNAME", "alice");
            env::set_var("SEEDER_PASSWORD", "secret");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.watch_dir, PathBuf::from("/data/files"));
            assert_eq!(config.throttle, Duration::from_millis(250));
            assert_eq!(config.credential_poll, Duration::from_secs(5));
            assert_eq!(config.request_timeout, Some(Duration::from_secs(60)));

            let creds = config.credentials.expect("credentials");
            assert_eq!(creds.username(), "alice");
            assert_eq!(creds.password(), "secret");
        });
    }

    #[test]
    #[serial]
    fn test_zero_throttle_allowed() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_THROTTLE_MS", "0");

            let config = Config::from_env().expect("zero throttle is valid");
            assert_eq!(config.throttle, Duration::ZERO);
        });
    }

    #[test]
    #[serial]
    fn test_invalid_throttle() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_THROTTLE_MS", "fast");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "SEEDER_THROTTLE_MS"
            ));
        });
    }

    #[test]
    #[serial]
    fn test_zero_poll_interval_rejected() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_CREDENTIAL_POLL_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, ref message }
                    if key == "SEEDER_CREDENTIAL_POLL_SECS" && message.contains("at least 1")
            ));
        });
    }

    #[test]
    #[serial]
    fn test_username_without_password_rejected() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_USERNAME", "alice");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "SEEDER_PASSWORD"));
        });
    }

    #[test]
    #[serial]
    fn test_password_without_username_rejected() {
        with_clean_env(|| {
            env::set_var("SEEDER_SERVER_URL", "https://seed.example.com/upload");
            env::set_var("SEEDER_PASSWORD", "secret");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "SEEDER_USERNAME"));
        });
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "SEEDER_THROTTLE_MS".to_string(),
            message: "expected non-negative integer, got 'x'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for SEEDER_THROTTLE_MS: expected non-negative integer, got 'x'"
        );
        assert_eq!(
            ConfigError::NoHomeDirectory.to_string(),
            "failed to determine home directory"
        );
    }
}
