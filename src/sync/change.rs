//! Change-sets and their wire form.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::core::SyncError;
use crate::rpc::{FailedEntry, FileChange};

/// One change to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEntry {
    /// Create or overwrite the file with these bytes.
    Upsert {
        /// Relative path.
        path: String,
        /// Full file content.
        content: Vec<u8>,
    },
    /// Remove the path (recursively) and prune empty ancestors.
    Delete {
        /// Relative path.
        path: String,
    },
}

impl ChangeEntry {
    /// Relative path this entry acts on.
    pub fn path(&self) -> &str {
        match self {
            ChangeEntry::Upsert { path, .. } | ChangeEntry::Delete { path } => path,
        }
    }

    /// Whether this is a delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeEntry::Delete { .. })
    }
}

impl From<&ChangeEntry> for FileChange {
    fn from(entry: &ChangeEntry) -> Self {
        match entry {
            ChangeEntry::Upsert { path, content } => FileChange {
                path: path.clone(),
                content: Some(STANDARD.encode(content)),
                deleted: false,
            },
            ChangeEntry::Delete { path } => FileChange {
                path: path.clone(),
                content: None,
                deleted: true,
            },
        }
    }
}

impl TryFrom<&FileChange> for ChangeEntry {
    type Error = SyncError;

    fn try_from(change: &FileChange) -> Result<Self, Self::Error> {
        if change.deleted {
            return Ok(ChangeEntry::Delete {
                path: change.path.clone(),
            });
        }

        let encoded = change
            .content
            .as_deref()
            .ok_or_else(|| SyncError::MissingContent(change.path.clone()))?;
        let content = STANDARD
            .decode(encoded)
            .map_err(|source| SyncError::InvalidContent {
                path: change.path.clone(),
                source,
            })?;

        Ok(ChangeEntry::Upsert {
            path: change.path.clone(),
            content,
        })
    }
}

/// Ordered list of changes with at most one entry per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<ChangeEntry>,
    paths: HashSet<String>,
}

impl ChangeSet {
    /// An empty change-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Fails if its path is already present.
    pub fn push(&mut self, entry: ChangeEntry) -> Result<(), SyncError> {
        if !self.paths.insert(entry.path().to_string()) {
            return Err(SyncError::DuplicatePath(entry.path().to_string()));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Whether an entry for `path` is present.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Entries in order.
    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of upserts and deletes.
    pub fn counts(&self) -> (usize, usize) {
        let deletes = self.entries.iter().filter(|e| e.is_delete()).count();
        (self.entries.len() - deletes, deletes)
    }

    /// Encode for a file-watch request.
    pub fn to_wire(&self) -> Vec<FileChange> {
        self.entries.iter().map(FileChange::from).collect()
    }

    /// Decode a file-watch request.
    ///
    /// Entries that cannot be decoded (missing or invalid content, repeated
    /// path) are skipped and reported; the rest are kept in order.
    pub fn from_wire(files: &[FileChange]) -> (Self, Vec<FailedEntry>) {
        let mut changes = ChangeSet::new();
        let mut failed = Vec::new();

        for file in files {
            let decoded = ChangeEntry::try_from(file).and_then(|entry| changes.push(entry));
            if let Err(e) = decoded {
                failed.push(FailedEntry::new(file.path.clone(), e));
            }
        }

        (changes, failed)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
