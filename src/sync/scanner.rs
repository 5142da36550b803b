//! Directory scanner.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::path::to_relative;
use super::snapshot::{FileRecord, Snapshot};
use crate::core::SyncError;

/// Walk `root` and record every regular file beneath it.
///
/// Symbolic links are neither followed nor recorded. The scan is
/// all-or-nothing: any walk or metadata failure fails the whole scan, so a
/// partial snapshot never turns into spurious deletes.
pub fn scan(root: &Path) -> Result<Snapshot, SyncError> {
    let metadata = fs::metadata(root).map_err(|e| SyncError::filesystem(root, e))?;
    if !metadata.is_dir() {
        return Err(SyncError::NotADirectory(root.to_path_buf()));
    }

    let mut snapshot = Snapshot::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1);

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| SyncError::InvalidPath(entry.path().display().to_string()))?;
        let Some(path) = to_relative(relative) else {
            warn!(path = %entry.path().display(), "skipping file with non-UTF-8 name");
            continue;
        };

        let metadata = entry.metadata()?;
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::filesystem(entry.path(), e))?;

        snapshot.insert(FileRecord {
            path,
            modified,
            size: metadata.len(),
        })?;
    }

    debug!(root = %root.display(), files = snapshot.len(), "scan complete");
    Ok(snapshot)
}
