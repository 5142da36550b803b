//! Request dispatch.
//!
//! Routes each inbound frame by `request_type` to its handler and builds the
//! response frame. A frame that cannot be understood is logged and dropped;
//! it never ends the session.

use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::core::FILE_WATCH_ACK;
use crate::rpc::{
    EchoPayload, Envelope, EnvelopeHeader, FailedEntry, FileWatchRequest, FileWatchResponse,
    RequestType,
};
use crate::sync::{apply, ChangeSet};

/// Turns request frames into response frames.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    root: PathBuf,
}

impl Dispatcher {
    /// Dispatch file-watch requests into `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sync root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle one request frame.
    ///
    /// Returns the response frame, or `None` if the request was dropped.
    pub async fn handle(&self, frame: &str) -> Option<String> {
        let header = match EnvelopeHeader::decode(frame) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "dropping malformed request");
                return None;
            }
        };

        let request_type: RequestType = match header.request_type.parse() {
            Ok(request_type) => request_type,
            Err(e) => {
                warn!(request_id = %header.request_id, error = %e, "dropping request");
                return None;
            }
        };

        let encoded = match request_type {
            RequestType::Echo => {
                let request = decode::<EchoPayload>(frame, &header)?;
                debug!(request_id = %request.request_id, "echo");
                request.reply(&request.payload).encode()
            }
            RequestType::FileWatch => {
                let Envelope {
                    request_id,
                    request_type,
                    payload,
                } = decode::<FileWatchRequest>(frame, &header)?;
                debug!(request_id = %request_id, entries = payload.files.len(), "file watch");
                let response = self.file_watch(payload).await;
                Envelope::new(request_id, request_type, response).encode()
            }
        };

        match encoded {
            Ok(response) => Some(response),
            Err(e) => {
                error!(request_id = %header.request_id, error = %e, "failed to encode response");
                None
            }
        }
    }

    /// Decode and apply a change-set, reporting every entry that was not
    /// applied.
    pub async fn file_watch(&self, request: FileWatchRequest) -> FileWatchResponse {
        let root = self.root.clone();
        let paths: Vec<String> = request.files.iter().map(|f| f.path.clone()).collect();

        let applied = tokio::task::spawn_blocking(move || {
            let (changes, mut failed) = ChangeSet::from_wire(&request.files);
            let report = apply(&root, &changes)?;
            failed.extend(report.failed);
            Ok::<_, crate::core::SyncError>(failed)
        })
        .await;

        let failed = match applied {
            Ok(Ok(failed)) => failed,
            Ok(Err(e)) => {
                error!(root = %self.root.display(), error = %e, "cannot apply change-set");
                fail_every(&paths, &e)
            }
            Err(e) => {
                error!(error = %e, "apply task failed");
                fail_every(&paths, &e)
            }
        };

        FileWatchResponse {
            value: FILE_WATCH_ACK.to_string(),
            failed,
        }
    }
}

fn decode<P: serde::de::DeserializeOwned>(
    frame: &str,
    header: &EnvelopeHeader,
) -> Option<Envelope<P>> {
    match Envelope::<P>::decode(frame) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(
                request_id = %header.request_id,
                request_type = %header.request_type,
                error = %e,
                "dropping undecodable request"
            );
            None
        }
    }
}

fn fail_every(paths: &[String], reason: &dyn std::fmt::Display) -> Vec<FailedEntry> {
    paths
        .iter()
        .map(|path| FailedEntry::new(path.clone(), reason))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    async fn respond(dispatcher: &Dispatcher, request: Value) -> Option<Value> {
        dispatcher
            .handle(&request.to_string())
            .await
            .map(|frame| serde_json::from_str(&frame).unwrap())
    }

    #[tokio::test]
    async fn test_echo() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(dir.path());

        let response = respond(
            &dispatcher,
            json!({"request_id": "e1", "request_type": "ECHO", "value": "hello there"}),
        )
        .await
        .unwrap();
        assert_eq!(
            response,
            json!({"request_id": "e1", "request_type": "ECHO", "value": "hello there"})
        );
    }

    #[tokio::test]
    async fn test_file_watch_applies_and_acknowledges() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(dir.path());

        let response = respond(
            &dispatcher,
            json!({
                "request_id": "f1",
                "request_type": "FILE_WATCH",
                "files": [{"path": "a.txt", "content": "aGk=", "deleted": false}]
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            response,
            json!({"request_id": "f1", "request_type": "FILE_WATCH", "value": FILE_WATCH_ACK})
        );
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_file_watch_reports_failed_entries() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(dir.path());

        let response = respond(
            &dispatcher,
            json!({
                "request_id": "f2",
                "request_type": "FILE_WATCH",
                "files": [
                    {"path": "ok.txt", "content": "aGk=", "deleted": false},
                    {"path": "bad.txt", "content": "%%%", "deleted": false},
                    {"path": "../escape.txt", "content": "aGk=", "deleted": false}
                ]
            }),
        )
        .await
        .unwrap();

        let failed: Vec<&str> = response["failed"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["path"].as_str().unwrap())
            .collect();
        assert_eq!(failed, vec!["bad.txt", "../escape.txt"]);
        assert_eq!(response["value"], FILE_WATCH_ACK);
        assert!(dir.path().join("ok.txt").exists());
    }

    #[tokio::test]
    async fn test_malformed_requests_dropped() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(dir.path());

        assert!(dispatcher.handle("not json at all").await.is_none());
        assert!(respond(&dispatcher, json!({"request_type": "ECHO", "value": "x"}))
            .await
            .is_none());
        assert!(respond(&dispatcher, json!({"request_id": "u", "request_type": "PING"}))
            .await
            .is_none());
        assert!(respond(&dispatcher, json!({"request_id": "m", "request_type": "ECHO"}))
            .await
            .is_none());

        // Still serving afterwards.
        assert!(respond(
            &dispatcher,
            json!({"request_id": "ok", "request_type": "ECHO", "value": "v"})
        )
        .await
        .is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unusable_root_fails_every_entry() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let dispatcher = Dispatcher::new(blocker.join("root"));

        let response = dispatcher
            .file_watch(FileWatchRequest {
                files: vec![crate::rpc::FileChange {
                    path: "a.txt".into(),
                    content: Some("aGk=".into()),
                    deleted: false,
                }],
            })
            .await;
        assert_eq!(response.failed.len(), 1);
        assert_eq!(response.value, FILE_WATCH_ACK);
    }
}
