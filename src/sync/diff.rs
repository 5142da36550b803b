//! Diff engine.
//!
//! Compares a fresh scan against the caller's prior snapshot. Change
//! detection is by modification time only: a file is sent when its mtime is
//! strictly after the cutoff, so content rewritten with an older mtime
//! (for example `cp -p`) is not noticed.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::change::{ChangeEntry, ChangeSet};
use super::path::resolve;
use super::scanner::scan;
use super::snapshot::Snapshot;
use crate::core::SyncError;

/// A file that changed but could not be read.
#[derive(Debug)]
pub struct SkippedFile {
    /// Relative path.
    pub path: String,
    /// Why it was skipped.
    pub error: SyncError,
}

/// Result of one diff.
#[derive(Debug)]
pub struct Diff {
    /// The new snapshot, to become the caller's prior state once the
    /// changes are delivered.
    pub snapshot: Snapshot,
    /// Upserts (in path order) followed by deletes.
    pub changes: ChangeSet,
    /// Changed files left out of `changes` because reading them failed.
    pub skipped: Vec<SkippedFile>,
}

impl Diff {
    /// Whether anything needs sending.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Scan `root` and compute the changes since `prior` / `cutoff`.
pub fn diff(root: &Path, prior: &Snapshot, cutoff: SystemTime) -> Result<Diff, SyncError> {
    diff_with_retry(root, prior, cutoff, &BTreeSet::new())
}

/// Like [`diff`], also resending every path in `retry` regardless of mtime:
/// as an upsert if it still exists, as a delete otherwise.
pub fn diff_with_retry(
    root: &Path,
    prior: &Snapshot,
    cutoff: SystemTime,
    retry: &BTreeSet<String>,
) -> Result<Diff, SyncError> {
    let snapshot = scan(root)?;
    let mut changes = ChangeSet::new();
    let mut skipped = Vec::new();

    for record in &snapshot {
        if record.modified <= cutoff && !retry.contains(&record.path) {
            continue;
        }

        match read_file(root, &record.path) {
            Ok(content) => changes.push(ChangeEntry::Upsert {
                path: record.path.clone(),
                content,
            })?,
            Err(error) => {
                warn!(path = %record.path, error = %error, "skipping unreadable file");
                skipped.push(SkippedFile {
                    path: record.path.clone(),
                    error,
                });
            }
        }
    }

    let removed = prior
        .paths()
        .chain(retry.iter().map(String::as_str))
        .filter(|path| !snapshot.contains(path));
    for path in removed {
        if !changes.contains(path) {
            changes.push(ChangeEntry::Delete {
                path: path.to_string(),
            })?;
        }
    }

    let (upserts, deletes) = changes.counts();
    debug!(
        root = %root.display(),
        upserts,
        deletes,
        skipped = skipped.len(),
        "diff complete"
    );

    Ok(Diff {
        snapshot,
        changes,
        skipped,
    })
}

fn read_file(root: &Path, relative: &str) -> Result<Vec<u8>, SyncError> {
    let path = resolve(root, relative)?;
    fs::read(&path).map_err(|e| SyncError::filesystem(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn paths(changes: &ChangeSet) -> Vec<(&str, bool)> {
        changes.iter().map(|e| (e.path(), e.is_delete())).collect()
    }

    #[test]
    fn test_first_diff_sends_everything() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hi");
        write(dir.path(), "d/b.txt", "b");

        let diff = diff(dir.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
        assert_eq!(paths(&diff.changes), vec![("a.txt", false), ("d/b.txt", false)]);
        assert_eq!(
            diff.changes.entries()[0],
            ChangeEntry::Upsert {
                path: "a.txt".into(),
                content: b"hi".to_vec()
            }
        );
        assert_eq!(diff.snapshot.len(), 2);
    }

    #[test]
    fn test_unchanged_tree_yields_empty_diff() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hi");

        let first = diff(dir.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
        let cutoff = SystemTime::now() + Duration::from_secs(1);
        let second = diff(dir.path(), &first.snapshot, cutoff).unwrap();

        assert!(second.is_empty());
        assert_eq!(second.snapshot.len(), 1);
    }

    #[test]
    fn test_mtime_must_be_strictly_after_cutoff() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hi");

        let snapshot = scan(dir.path()).unwrap();
        let mtime = snapshot.get("a.txt").unwrap().modified;

        assert!(diff(dir.path(), &snapshot, mtime).unwrap().is_empty());
        let earlier = mtime - Duration::from_nanos(1);
        assert_eq!(diff(dir.path(), &snapshot, earlier).unwrap().changes.len(), 1);
    }

    #[test]
    fn test_removed_file_becomes_delete() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hi");
        write(dir.path(), "keep.txt", "k");

        let first = diff(dir.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
        fs::remove_file(dir.path().join("a.txt")).unwrap();

        let cutoff = SystemTime::now() + Duration::from_secs(1);
        let second = diff(dir.path(), &first.snapshot, cutoff).unwrap();
        assert_eq!(paths(&second.changes), vec![("a.txt", true)]);
    }

    #[test]
    fn test_retry_resends_regardless_of_mtime() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "hi");

        let first = diff(dir.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
        let cutoff = SystemTime::now() + Duration::from_secs(1);
        let retry: BTreeSet<String> = ["a.txt".to_string(), "vanished.txt".to_string()].into();

        let second = diff_with_retry(dir.path(), &first.snapshot, cutoff, &retry).unwrap();
        assert_eq!(
            paths(&second.changes),
            vec![("a.txt", false), ("vanished.txt", true)]
        );
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        assert!(diff(&missing, &Snapshot::new(), UNIX_EPOCH).is_err());
    }
}
