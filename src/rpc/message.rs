//! Wire message types.
//!
//! Every frame is one JSON object: the envelope fields `request_id` and
//! `request_type` plus the payload fields flattened beside them.
//!
//! ```text
//! {"request_id":"…","request_type":"ECHO","value":"hello there"}
//! {"request_id":"…","request_type":"FILE_WATCH","files":[{"path":"a.txt","content":"aGk=","deleted":false}]}
//! {"request_id":"…","request_type":"FILE_WATCH","value":"Received file watch request."}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::{REQUEST_TYPE_ECHO, REQUEST_TYPE_FILE_WATCH};

/// Logical operation carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Connectivity check; the value comes back verbatim.
    #[serde(rename = "ECHO")]
    Echo,
    /// A serialized change-set to apply.
    #[serde(rename = "FILE_WATCH")]
    FileWatch,
}

impl RequestType {
    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Echo => REQUEST_TYPE_ECHO,
            RequestType::FileWatch => REQUEST_TYPE_FILE_WATCH,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            REQUEST_TYPE_ECHO => Ok(RequestType::Echo),
            REQUEST_TYPE_FILE_WATCH => Ok(RequestType::FileWatch),
            other => Err(format!("unknown request type: {other}")),
        }
    }
}

/// The outer message shape.
///
/// `request_id` is the sole join key between a request and its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Sender-generated identifier, unique per in-flight request.
    pub request_id: String,
    /// Operation tag.
    pub request_type: RequestType,
    /// Operation-specific fields.
    #[serde(flatten)]
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Wrap a payload.
    pub fn new(request_id: impl Into<String>, request_type: RequestType, payload: P) -> Self {
        Self {
            request_id: request_id.into(),
            request_type,
            payload,
        }
    }

    /// Build the reply envelope for this request: same id, same type.
    pub fn reply<R>(&self, payload: R) -> Envelope<R> {
        Envelope {
            request_id: self.request_id.clone(),
            request_type: self.request_type,
            payload,
        }
    }
}

impl<P: Serialize> Envelope<P> {
    /// Encode to a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<P: DeserializeOwned> Envelope<P> {
    /// Decode from a text frame.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Envelope fields only, used to route a frame before its payload is
/// decoded.
///
/// `request_type` stays a string so frames with unknown types can still be
/// reported by id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvelopeHeader {
    /// Identifier.
    pub request_id: String,
    /// Raw type tag.
    #[serde(default)]
    pub request_type: String,
}

impl EnvelopeHeader {
    /// Decode the header of a text frame.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Echo request and response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoPayload {
    /// The value to echo.
    pub value: String,
}

/// One serialized change-set entry.
///
/// `deleted: true` entries carry no content; upserts carry the file bytes
/// in standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the sync root, `/`-separated.
    pub path: String,
    /// Base64 file content (upserts only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Whether the path was removed.
    #[serde(default)]
    pub deleted: bool,
}

/// File-watch request payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileWatchRequest {
    /// The change-set, in order.
    #[serde(default)]
    pub files: Vec<FileChange>,
}

/// An entry the receiver could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    /// Relative path of the entry.
    pub path: String,
    /// Why it failed.
    pub error: String,
}

impl FailedEntry {
    /// Record a failure for `path`.
    pub fn new(path: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

/// File-watch response payload.
///
/// `failed` is omitted from the wire when empty, so a fully successful
/// response has exactly the `{request_id, request_type, value}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWatchResponse {
    /// Free-form acknowledgement.
    pub value: String,
    /// Entries that were not applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedEntry>,
}
