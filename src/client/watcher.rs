//! Poll-based tree watcher.
//!
//! A [`FileWatcher`] owns the sync state of one root: the last snapshot the
//! server acknowledged, the mtime cutoff and the set of paths to resend.
//! Each [`FileWatcher::sync`] call performs one scan/diff/send cycle and
//! advances that state only once the server has acknowledged the batch.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::client::{ClientError, SyncClient};
use crate::core::{Clock, SystemClock};
use crate::rpc::FailedEntry;
use crate::sync::{diff_with_retry, Snapshot};

/// Result of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Upserts sent.
    pub upserts: usize,
    /// Deletes sent.
    pub deletes: usize,
    /// Entries the server reported as not applied.
    pub failed: Vec<FailedEntry>,
    /// Changed files that could not be read locally.
    pub skipped: Vec<String>,
}

impl SyncOutcome {
    /// Whether anything was sent.
    pub fn sent_anything(&self) -> bool {
        self.upserts + self.deletes > 0
    }
}

/// Sync state for one root.
pub struct FileWatcher {
    root: PathBuf,
    snapshot: Arc<Snapshot>,
    cutoff: SystemTime,
    retry: BTreeSet<String>,
    clock: Arc<dyn Clock>,
    last_sync: Option<SystemTime>,
}

impl FileWatcher {
    /// Watch `root` using the system clock.
    ///
    /// The first cycle sends every file under the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    /// Watch `root` using a custom clock.
    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            snapshot: Arc::new(Snapshot::new()),
            cutoff: UNIX_EPOCH,
            retry: BTreeSet::new(),
            clock,
            last_sync: None,
        }
    }

    /// Run one scan/diff/send cycle.
    ///
    /// If the scan or the exchange fails, or the call is cancelled, the
    /// prior snapshot and cutoff are kept and the next call retries the same
    /// changes. Nothing is sent when the tree is unchanged.
    pub async fn sync(&mut self, client: &SyncClient) -> Result<SyncOutcome, ClientError> {
        let started = self.clock.now();

        let root = self.root.clone();
        let prior = Arc::clone(&self.snapshot);
        let cutoff = self.cutoff;
        let retry = self.retry.clone();

        let diff =
            tokio::task::spawn_blocking(move || diff_with_retry(&root, &prior, cutoff, &retry))
                .await
                .map_err(|e| ClientError::Task(e.to_string()))??;

        let (upserts, deletes) = diff.changes.counts();
        let skipped: Vec<String> = diff.skipped.into_iter().map(|s| s.path).collect();

        let failed = if diff.changes.is_empty() {
            Vec::new()
        } else {
            let response = client.file_watch(&diff.changes).await?;
            debug!(ack = %response.value, "server acknowledged change-set");
            response.failed
        };

        for entry in &failed {
            warn!(path = %entry.path, error = %entry.error, "server could not apply change");
        }

        self.snapshot = Arc::new(diff.snapshot);
        self.cutoff = started;
        self.retry = retry_set(&failed, &skipped);
        self.last_sync = Some(started);

        if upserts + deletes > 0 {
            info!(
                root = %self.root.display(),
                upserts,
                deletes,
                failed = failed.len(),
                "sync cycle complete"
            );
        }

        Ok(SyncOutcome {
            upserts,
            deletes,
            failed,
            skipped,
        })
    }

    /// The watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last snapshot the server acknowledged.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Files modified after this time are sent on the next cycle.
    pub fn cutoff(&self) -> SystemTime {
        self.cutoff
    }

    /// Paths that will be resent on the next cycle.
    pub fn pending_retries(&self) -> &BTreeSet<String> {
        &self.retry
    }

    /// Start time of the last successful cycle.
    pub fn last_sync(&self) -> Option<SystemTime> {
        self.last_sync
    }
}

/// Paths to resend next cycle: whatever the server could not apply plus
/// whatever could not be read here.
fn retry_set(failed: &[FailedEntry], skipped: &[String]) -> BTreeSet<String> {
    failed
        .iter()
        .map(|f| f.path.clone())
        .chain(skipped.iter().cloned())
        .collect()
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("files", &self.snapshot.len())
            .field("cutoff", &self.cutoff)
            .field("retry", &self.retry)
            .finish()
    }
}
