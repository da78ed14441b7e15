//! Candidate-path source for the watched directory.
//!
//! Two pieces feed the work queue:
//!
//! - [`scan_directory`] lists the directory once when monitoring begins.
//! - [`DirWatcher`] reports paths that appear afterwards, whether written in
//!   place or renamed into the directory.
//!
//! On Linux a file written in place is reported when its writer closes it,
//! not when it is created, so a half-written file is never picked up. Other
//! platforms have no close notification and report the create.
//!
//! The [`notify`] callback runs on the watcher's own thread. It is kept
//! lightweight: it filters events and forwards paths through an unbounded
//! channel; the receiving side decides what to do with them.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use dat_seeder::watcher::DirWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let _watcher = DirWatcher::new(PathBuf::from("/data/server_files"), &["pushedFiles.json"], tx)?;
//!
//!     while let Some(path) = rx.recv().await {
//!         println!("New file: {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use notify::event::{AccessKind, AccessMode};
#[cfg(not(target_os = "linux"))]
use notify::event::CreateKind;
use notify::{
    event::{ModifyKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Errors that can occur during directory watching.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to list the directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Watches a single directory (non-recursively) for newly appearing paths.
///
/// Dropping the watcher stops the notifications.
#[derive(Debug)]
pub struct DirWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
}

impl DirWatcher {
    /// Starts watching `watch_dir`, sending each new path on `sender`.
    ///
    /// Paths whose file name is in `ignored` are never sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or the watcher
    /// cannot be initialized.
    pub fn new(
        watch_dir: PathBuf,
        ignored: &[&str],
        sender: mpsc::UnboundedSender<PathBuf>,
    ) -> Result<Self> {
        if !watch_dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(watch_dir));
        }

        let ignored: Vec<OsString> = ignored.iter().map(OsString::from).collect();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &ignored, &sender);
            },
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        info!(watch_dir = %watch_dir.display(), "Watching directory for new files");

        Ok(Self { watcher })
    }
}

fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    ignored: &[OsString],
    sender: &mpsc::UnboundedSender<PathBuf>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    for path in new_paths(&event) {
        if path
            .file_name()
            .is_some_and(|name| ignored.iter().any(|i| i == name))
        {
            trace!(path = %path.display(), "Ignoring path");
            continue;
        }

        debug!(path = %path.display(), "New path detected");
        if sender.send(path.clone()).is_err() {
            warn!(path = %path.display(), "Path receiver dropped");
        }
    }
}

/// Paths an event reports as newly present in the directory.
fn new_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        #[cfg(target_os = "linux")]
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => &event.paths,
        #[cfg(not(target_os = "linux"))]
        EventKind::Create(CreateKind::File | CreateKind::Any | CreateKind::Other) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            &event.paths[event.paths.len().saturating_sub(1)..]
        }
        _ => &[],
    }
}

/// Lists every entry of `dir`, sorted by path.
///
/// Entries that cannot be read are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the directory itself cannot be read.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to read directory entry"),
        }
    }

    paths.sort();
    debug!(dir = %dir.display(), count = paths.len(), "Scanned directory");

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    #[cfg(target_os = "linux")]
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    /// The event that marks a file written in place as ready.
    #[cfg(target_os = "linux")]
    const FILE_READY: EventKind = EventKind::Access(AccessKind::Close(AccessMode::Write));
    #[cfg(not(target_os = "linux"))]
    const FILE_READY: EventKind = EventKind::Create(CreateKind::File);

    fn create_test_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp dir")
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    fn collect(event: Event, ignored: &[&str]) -> Vec<PathBuf> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ignored: Vec<OsString> = ignored.iter().map(OsString::from).collect();
        handle_notify_event(Ok(event), &ignored, &tx);
        drop(tx);

        let mut out = Vec::new();
        while let Ok(path) = rx.try_recv() {
            out.push(path);
        }
        out
    }

    #[test]
    fn test_written_file_forwarded() {
        let out = collect(event(FILE_READY, &["/d/abc-1.dat"]), &[]);
        assert_eq!(out, vec![PathBuf::from("/d/abc-1.dat")]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_create_alone_not_forwarded() {
        let out = collect(
            event(EventKind::Create(CreateKind::File), &["/d/abc-1.dat"]),
            &[],
        );
        assert!(out.is_empty());

        let out = collect(
            event(
                EventKind::Access(AccessKind::Close(AccessMode::Read)),
                &["/d/abc-1.dat"],
            ),
            &[],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_rename_into_directory_forwarded() {
        let out = collect(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                &["/d/abc-2.dat"],
            ),
            &[],
        );
        assert_eq!(out, vec![PathBuf::from("/d/abc-2.dat")]);

        let out = collect(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/d/partial.tmp", "/d/abc-3.dat"],
            ),
            &[],
        );
        assert_eq!(out, vec![PathBuf::from("/d/abc-3.dat")]);
    }

    #[test]
    fn test_other_events_dropped() {
        for kind in [
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Remove(RemoveKind::File),
            EventKind::Create(CreateKind::Folder),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
        ] {
            assert!(collect(event(kind, &["/d/abc-1.dat"]), &[]).is_empty());
        }
    }

    #[test]
    fn test_ignored_names_dropped() {
        let ignored = ["pushedFiles.json", ".pushedFiles.json.tmp"];

        let out = collect(event(FILE_READY, &["/d/.pushedFiles.json.tmp"]), &ignored);
        assert!(out.is_empty());

        let out = collect(
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/d/.pushedFiles.json.tmp", "/d/pushedFiles.json"],
            ),
            &ignored,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_scan_directory_sorted() {
        let dir = create_test_dir();
        for name in ["b-2.dat", "a-1.dat", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let paths = scan_directory(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a-1.dat", "b-2.dat", "notes.txt"]);
    }

    #[test]
    fn test_scan_missing_directory_errors() {
        let dir = create_test_dir();
        let result = scan_directory(&dir.path().join("missing"));
        assert!(matches!(result, Err(WatcherError::Io(_))));
    }

    #[test]
    fn test_new_rejects_missing_directory() {
        let dir = create_test_dir();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = DirWatcher::new(dir.path().join("missing"), &[], tx);
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_detects_new_file() {
        let dir = create_test_dir();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = DirWatcher::new(dir.path().to_path_buf(), &[], tx).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(dir.path().join("abc-1.dat"), b"payload").unwrap();

        let path = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for watch event")
            .expect("channel closed");
        assert_eq!(path.file_name().unwrap(), "abc-1.dat");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_file_reported_only_after_writer_closes() {
        let dir = create_test_dir();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = DirWatcher::new(dir.path().to_path_buf(), &[], tx).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut file = fs::File::create(dir.path().join("slow-1.dat")).unwrap();
        file.write_all(b"first half").unwrap();

        let early = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(early.is_err(), "reported before the writer finished");

        file.write_all(b" second half").unwrap();
        drop(file);

        let path = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for watch event")
            .expect("channel closed");
        assert_eq!(path.file_name().unwrap(), "slow-1.dat");
        assert_eq!(fs::read(&path).unwrap(), b"first half second half");
    }
}
