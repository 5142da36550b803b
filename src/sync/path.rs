//! Root-relative paths.
//!
//! On the wire and in snapshots a path is a `/`-separated string relative to
//! the sync root. Resolving one back to the filesystem is confined to the
//! root: absolute paths and `..` components are rejected.

use std::path::{Component, Path, PathBuf};

use crate::core::SyncError;

/// Convert a path relative to the root into its `/`-separated form.
///
/// Returns `None` for paths with non-UTF-8 components or components that
/// would not survive a round trip (`..`, prefixes, the root itself).
pub fn to_relative(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Resolve a `/`-separated relative path under `root`.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, SyncError> {
    let invalid = || SyncError::InvalidPath(relative.to_string());

    if relative.is_empty() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(invalid());
    }

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid()),
            part => {
                // A part must be one plain component on this platform too.
                let mut components = Path::new(part).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => resolved.push(part),
                    _ => return Err(invalid()),
                }
                depth += 1;
            }
        }
    }

    if depth == 0 {
        return Err(invalid());
    }
    Ok(resolved)
}
