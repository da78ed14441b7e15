//! Durable record of files already pushed to the object store.
//!
//! The ledger is a JSON object stored in the watched directory, mapping each
//! pushed file's base name to `true`. It is read once at startup and rewritten
//! in full after every successful push.
//!
//! # Recovery
//!
//! A missing or unparsable ledger file is treated as an empty ledger. This is
//! a recovery path rather than an error: the worst case is that files already
//! pushed are offered to the control server again.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use dat_seeder::ledger::Ledger;
//!
//! let mut ledger = Ledger::load(Path::new("/data/server_files"));
//! if !ledger.is_pushed("abc-1.dat") {
//!     ledger.record_pushed("abc-1.dat")?;
//! }
//! # Ok::<(), dat_seeder::ledger::LedgerError>(())
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// File name of the ledger inside the watched directory.
pub const LEDGER_FILE_NAME: &str = "pushedFiles.json";

/// File name of the temporary snapshot written before the atomic rename.
pub const LEDGER_TMP_FILE_NAME: &str = ".pushedFiles.json.tmp";

/// Errors that can occur while persisting the ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Writing or renaming the snapshot failed.
    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the mapping failed.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Mapping of file name to "already pushed", backed by a JSON file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, bool>,
}

impl Ledger {
    /// Loads the ledger stored in `dir`.
    ///
    /// Never fails: a missing file or a file that cannot be parsed yields an
    /// empty ledger.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(LEDGER_FILE_NAME);
        let entries = read_entries(&path);

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded pushed-files ledger"
        );

        Self { path, entries }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if `filename` has already been pushed.
    #[must_use]
    pub fn is_pushed(&self, filename: &str) -> bool {
        self.entries.get(filename).copied().unwrap_or(false)
    }

    /// Number of files recorded as pushed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no files have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `filename` as pushed and persists the whole ledger.
    ///
    /// The snapshot is written to a temporary sibling and renamed over the
    /// ledger file, so a failed write leaves the previous snapshot intact.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the snapshot cannot be serialized or written.
    /// The in-memory entry is kept either way.
    pub fn record_pushed(&mut self, filename: &str) -> Result<(), LedgerError> {
        self.entries.insert(filename.to_string(), true);
        self.persist()
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, json.as_bytes()).map_err(|source| LedgerError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "Persisted ledger"
        );

        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, bool> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No ledger file, starting empty");
            return BTreeMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read ledger, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&data) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse ledger, starting empty");
            BTreeMap::new()
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_file_name(LEDGER_TMP_FILE_NAME);
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}
