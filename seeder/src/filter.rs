//! Upload eligibility for candidate paths.
//!
//! A candidate is eligible when its base name ends in `.dat` and the ledger
//! has no record of it. The store identifier sent to the control server is
//! the part of the file name before the first `-`.

use std::fmt;
use std::path::Path;

use crate::ledger::Ledger;

/// Required file extension, compared case-sensitively.
pub const DAT_EXTENSION: &str = "dat";

/// Why a candidate was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path has no final component.
    NoFileName,
    /// The file does not end in `.dat`.
    WrongExtension,
    /// The ledger already records this file name.
    AlreadyPushed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFileName => write!(f, "no file name"),
            Self::WrongExtension => write!(f, "not a .dat file"),
            Self::AlreadyPushed => write!(f, "already pushed"),
        }
    }
}

/// Result of checking a candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The file should be uploaded.
    Eligible {
        /// Base name of the file; the ledger key.
        filename: String,
        /// Identifier sent with the authorize request.
        store_id: String,
    },
    /// The file should be skipped.
    Skip(SkipReason),
}

/// Decides whether `path` should be uploaded.
///
/// Has no side effects.
#[must_use]
pub fn check(path: &Path, ledger: &Ledger) -> Eligibility {
    let Some(filename) = path.file_name().map(|name| name.to_string_lossy()) else {
        return Eligibility::Skip(SkipReason::NoFileName);
    };

    if !has_dat_extension(&filename) {
        return Eligibility::Skip(SkipReason::WrongExtension);
    }

    if ledger.is_pushed(&filename) {
        return Eligibility::Skip(SkipReason::AlreadyPushed);
    }

    Eligibility::Eligible {
        store_id: store_id(&filename).to_string(),
        filename: filename.into_owned(),
    }
}

/// Returns the store identifier for `filename`: everything before the first
/// `-`, or the whole name when there is none.
#[must_use]
pub fn store_id(filename: &str) -> &str {
    filename
        .split_once('-')
        .map_or(filename, |(prefix, _)| prefix)
}

// A leading dot does not start an extension (".dat" has none).
fn has_dat_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext == DAT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_with(entries: &[&str]) -> (TempDir, Ledger) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut ledger = Ledger::load(dir.path());
        for entry in entries {
            ledger.record_pushed(entry).unwrap();
        }
        (dir, ledger)
    }

    #[test]
    fn test_eligible_dat_file() {
        let (_dir, ledger) = ledger_with(&[]);

        assert_eq!(
            check(Path::new("/data/abc-1.dat"), &ledger),
            Eligibility::Eligible {
                filename: "abc-1.dat".to_string(),
                store_id: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_non_dat_always_skipped() {
        let (_dir, ledger) = ledger_with(&["notes.txt", "abc-1.DAT"]);

        for name in [
            "notes.txt",
            "abc-1.DAT",
            "abc-1.dat.bak",
            "abc-1",
            "pushedFiles.json",
            ".dat",
        ] {
            assert_eq!(
                check(Path::new(name), &ledger),
                Eligibility::Skip(SkipReason::WrongExtension),
                "{name} should be skipped"
            );
        }
    }

    #[test]
    fn test_pushed_dat_always_skipped() {
        let (_dir, ledger) = ledger_with(&["x-2.dat"]);

        assert_eq!(
            check(Path::new("/anywhere/x-2.dat"), &ledger),
            Eligibility::Skip(SkipReason::AlreadyPushed)
        );
    }

    #[test]
    fn test_ledger_key_is_base_name() {
        let (_dir, ledger) = ledger_with(&["x-2.dat"]);

        assert_eq!(
            check(Path::new("/other/dir/x-2.dat"), &ledger),
            Eligibility::Skip(SkipReason::AlreadyPushed)
        );
    }

    #[test]
    fn test_path_without_file_name() {
        let (_dir, ledger) = ledger_with(&[]);

        assert_eq!(
            check(Path::new("/"), &ledger),
            Eligibility::Skip(SkipReason::NoFileName)
        );
        assert_eq!(
            check(Path::new("foo/.."), &ledger),
            Eligibility::Skip(SkipReason::NoFileName)
        );
    }

    #[test]
    fn test_store_id_extraction() {
        assert_eq!(store_id("abc-1.dat"), "abc");
        assert_eq!(store_id("abc-def-1.dat"), "abc");
        assert_eq!(store_id("plain.dat"), "plain.dat");
        assert_eq!(store_id("-lead.dat"), "");
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::WrongExtension.to_string(), "not a .dat file");
        assert_eq!(SkipReason::AlreadyPushed.to_string(), "already pushed");
        assert_eq!(SkipReason::NoFileName.to_string(), "no file name");
    }
}
