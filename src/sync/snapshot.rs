//! Observed directory state.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::core::SyncError;

/// One regular file seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the sync root, `/`-separated.
    pub path: String,
    /// Last modification time.
    pub modified: SystemTime,
    /// Size in bytes.
    pub size: u64,
}

/// The set of regular files under a root at one point in time.
///
/// Records are kept ordered by path and no two share a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    /// An empty snapshot (nothing observed yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Fails if the path is already present.
    pub fn insert(&mut self, record: FileRecord) -> Result<(), SyncError> {
        if self.records.contains_key(&record.path) {
            return Err(SyncError::DuplicatePath(record.path));
        }
        self.records.insert(record.path.clone(), record);
        Ok(())
    }

    /// Look up a record by path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// Whether `path` was observed.
    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Records in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no file was observed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a FileRecord;
    type IntoIter = std::collections::btree_map::Values<'a, String, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: path.into(),
            modified: UNIX_EPOCH,
            size,
        }
    }

    #[test]
    fn test_snapshot_ordered() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(record("b.txt", 1)).unwrap();
        snapshot.insert(record("a/z.txt", 2)).unwrap();
        snapshot.insert(record("a.txt", 3)).unwrap();

        let paths: Vec<_> = snapshot.paths().collect();
        assert_eq!(paths, vec!["a.txt", "a/z.txt", "b.txt"]);
        assert_eq!(snapshot.total_size(), 6);
    }

    #[test]
    fn test_snapshot_rejects_duplicate_path() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(record("a.txt", 1)).unwrap();
        assert!(matches!(
            snapshot.insert(record("a.txt", 9)),
            Err(SyncError::DuplicatePath(_))
        ));
        assert_eq!(snapshot.get("a.txt").unwrap().size, 1);
    }
}
