//! Change application on the receiving side.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::change::{ChangeEntry, ChangeSet};
use super::path::resolve;
use crate::core::{SyncError, FILE_MODE, TEMP_FILE_PREFIX};
use crate::rpc::FailedEntry;

/// Outcome of applying one change-set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Files written.
    pub written: usize,
    /// Paths removed (or already absent).
    pub removed: usize,
    /// Entries skipped, with the reason.
    pub failed: Vec<FailedEntry>,
}

impl ApplyReport {
    /// Whether every entry was applied.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply `changes` under `root`, entry by entry.
///
/// A failing entry is logged, recorded in the report and skipped; later
/// entries are still applied. The call itself only fails if `root` cannot
/// be created. Applying the same change-set twice leaves the same tree.
pub fn apply(root: &Path, changes: &ChangeSet) -> Result<ApplyReport, SyncError> {
    fs::create_dir_all(root).map_err(|e| SyncError::filesystem(root, e))?;

    let mut report = ApplyReport::default();
    for entry in changes {
        let result = match entry {
            ChangeEntry::Upsert { path, content } => upsert(root, path, content),
            ChangeEntry::Delete { path } => delete(root, path),
        };

        match result {
            Ok(()) if entry.is_delete() => report.removed += 1,
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!(path = %entry.path(), error = %e, "failed to apply change");
                report.failed.push(FailedEntry::new(entry.path(), e));
            }
        }
    }

    debug!(
        root = %root.display(),
        written = report.written,
        removed = report.removed,
        failed = report.failed.len(),
        "change-set applied"
    );
    Ok(report)
}

/// Replace the file's content through a uniquely named scratch file in the
/// same directory, renamed over the target once fully written.
fn upsert(root: &Path, relative: &str, content: &[u8]) -> Result<(), SyncError> {
    let target = resolve(root, relative)?;
    let parent = target.parent().unwrap_or(root);
    fs::create_dir_all(parent).map_err(|e| SyncError::filesystem(parent, e))?;

    let mut scratch = scratch_builder()
        .tempfile_in(parent)
        .map_err(|e| SyncError::filesystem(parent, e))?;
    scratch
        .write_all(content)
        .map_err(|e| SyncError::filesystem(scratch.path(), e))?;

    // A failed persist drops the scratch file, which removes it.
    scratch
        .persist(&target)
        .map_err(|e| SyncError::filesystem(&target, e.error))?;
    Ok(())
}

fn scratch_builder() -> tempfile::Builder<'static, 'static> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(FILE_MODE));
    }
    builder
}

/// Remove the path and then its emptied ancestors.
fn delete(root: &Path, relative: &str) -> Result<(), SyncError> {
    let target = resolve(root, relative)?;

    let removed = match fs::symlink_metadata(&target) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(&target),
        Ok(_) => fs::remove_file(&target),
        Err(e) => Err(e),
    };
    match removed {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::filesystem(target, e)),
    }

    prune_empty_ancestors(root, &target);
    Ok(())
}

/// Walk up from `target`'s parent removing empty directories. Stops at the
/// first non-empty directory and never removes `root`.
fn prune_empty_ancestors(root: &Path, target: &Path) {
    let mut current = target.parent();

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }

        match fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
                match fs::remove_dir(dir) {
                    Ok(()) => debug!(dir = %dir.display(), "pruned empty directory"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        debug!(dir = %dir.display(), error = %e, "stopped pruning");
                        break;
                    }
                }
            }
            // Already gone; keep walking up.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "stopped pruning");
                break;
            }
        }

        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{diff, scan, Snapshot};
    use std::ffi::OsString;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn upsert_entry(path: &str, content: &[u8]) -> ChangeEntry {
        ChangeEntry::Upsert {
            path: path.into(),
            content: content.to_vec(),
        }
    }

    fn delete_entry(path: &str) -> ChangeEntry {
        ChangeEntry::Delete { path: path.into() }
    }

    fn change_set(entries: Vec<ChangeEntry>) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for entry in entries {
            changes.push(entry).unwrap();
        }
        changes
    }

    #[test]
    fn test_upsert_creates_parents() {
        let dir = TempDir::new().unwrap();
        let changes = change_set(vec![upsert_entry("a/b/c.txt", b"deep")]);

        let report = apply(dir.path(), &changes).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.written, 1);
        assert_eq!(fs::read(dir.path().join("a/b/c.txt")).unwrap(), b"deep");
    }

    #[test]
    fn test_upsert_overwrites_without_leftovers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "a much longer old content").unwrap();

        apply(dir.path(), &change_set(vec![upsert_entry("a.txt", b"hi")])).unwrap();

        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("a.txt")]);
    }

    #[test]
    fn test_upsert_leaves_lookalike_scratch_names_alone() {
        let dir = TempDir::new().unwrap();
        let changes = change_set(vec![
            upsert_entry("x", b"X"),
            upsert_entry("x.treesync-tmp", b"USER"),
            upsert_entry(".treesync-x", b"DOT"),
        ]);
        apply(dir.path(), &changes).unwrap();

        let report = apply(dir.path(), &change_set(vec![upsert_entry("x", b"X2")])).unwrap();
        assert!(report.is_clean());
        assert_eq!(fs::read(dir.path().join("x")).unwrap(), b"X2");
        assert_eq!(fs::read(dir.path().join("x.treesync-tmp")).unwrap(), b"USER");
        assert_eq!(fs::read(dir.path().join(".treesync-x")).unwrap(), b"DOT");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_delete_prunes_empty_ancestors() {
        let dir = TempDir::new().unwrap();
        apply(dir.path(), &change_set(vec![upsert_entry("a/b/c.txt", b"x")])).unwrap();

        let report = apply(dir.path(), &change_set(vec![delete_entry("a/b/c.txt")])).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_prune_stops_at_non_empty_directory() {
        let dir = TempDir::new().unwrap();
        let changes = change_set(vec![
            upsert_entry("a/b/c.txt", b"x"),
            upsert_entry("a/keep.txt", b"k"),
        ]);
        apply(dir.path(), &changes).unwrap();

        apply(dir.path(), &change_set(vec![delete_entry("a/b/c.txt")])).unwrap();
        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a/keep.txt").exists());
    }

    #[test]
    fn test_delete_directory_recursively() {
        let dir = TempDir::new().unwrap();
        apply(
            dir.path(),
            &change_set(vec![upsert_entry("d/x.txt", b"1"), upsert_entry("d/e/y.txt", b"2")]),
        )
        .unwrap();

        apply(dir.path(), &change_set(vec![delete_entry("d")])).unwrap();
        assert!(!dir.path().join("d").exists());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let changes = change_set(vec![
            upsert_entry("x/1.txt", b"one"),
            delete_entry("y/2.txt"),
            upsert_entry("3.txt", b"three"),
        ]);

        let first = apply(dir.path(), &changes).unwrap();
        let after_first = scan(dir.path()).unwrap();
        let second = apply(dir.path(), &changes).unwrap();
        let after_second = scan(dir.path()).unwrap();

        assert!(first.is_clean() && second.is_clean());
        let contents = |s: &Snapshot| {
            s.paths()
                .map(|p| (p.to_string(), fs::read(dir.path().join(p)).unwrap()))
                .collect::<Vec<_>>()
        };
        let expected = vec![
            ("3.txt".to_string(), b"three".to_vec()),
            ("x/1.txt".to_string(), b"one".to_vec()),
        ];
        assert_eq!(contents(&after_first), expected);
        assert_eq!(contents(&after_second), expected);
    }

    #[test]
    fn test_escaping_paths_fail_per_entry() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let changes = change_set(vec![
            upsert_entry("../escape.txt", b"nope"),
            upsert_entry("/abs.txt", b"nope"),
            upsert_entry("fine.txt", b"ok"),
        ]);

        let report = apply(&root, &changes).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(!dir.path().join("escape.txt").exists());
        assert!(root.join("fine.txt").exists());
    }

    #[test]
    fn test_failure_does_not_stop_later_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blocker"), "file").unwrap();

        let changes = change_set(vec![
            upsert_entry("blocker/child.txt", b"x"),
            upsert_entry("after.txt", b"y"),
        ]);
        let report = apply(dir.path(), &changes).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "blocker/child.txt");
        assert_eq!(fs::read(dir.path().join("after.txt")).unwrap(), b"y");
    }

    #[test]
    fn test_apply_converges_to_sender_tree() {
        let sender = TempDir::new().unwrap();
        let receiver = TempDir::new().unwrap();
        fs::create_dir_all(sender.path().join("n/m")).unwrap();
        fs::write(sender.path().join("n/m/f.txt"), "f").unwrap();
        fs::write(sender.path().join("top.txt"), "t").unwrap();

        let first = diff(sender.path(), &Snapshot::new(), UNIX_EPOCH).unwrap();
        apply(receiver.path(), &first.changes).unwrap();

        let received = scan(receiver.path()).unwrap();
        let theirs: Vec<_> = received.iter().map(|r| (r.path.clone(), r.size)).collect();
        let ours: Vec<_> = first.snapshot.iter().map(|r| (r.path.clone(), r.size)).collect();
        assert_eq!(theirs, ours);
    }
}
