//! Pending request table.
//!
//! Maps request identifiers to the one-shot channel that delivers their
//! response. Shared between callers issuing requests and the connection's
//! receive task; every access happens under one mutex and no lock is held
//! across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::error::RpcError;
use crate::transport::CloseKind;

/// What a waiter eventually receives: the raw response frame, or the reason
/// the session ended.
pub type Delivery = Result<String, RpcError>;

/// Why the table stopped accepting registrations.
#[derive(Debug, Clone)]
enum Shutdown {
    Closed,
    Lost(String),
}

impl Shutdown {
    fn from_close(kind: &CloseKind) -> Self {
        if kind.is_expected() {
            Shutdown::Closed
        } else {
            Shutdown::Lost(kind.to_string())
        }
    }

    fn to_error(&self) -> RpcError {
        match self {
            Shutdown::Closed => RpcError::ConnectionClosed,
            Shutdown::Lost(reason) => RpcError::ConnectionLost(reason.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    waiters: HashMap<String, oneshot::Sender<Delivery>>,
    shutdown: Option<Shutdown>,
}

/// Table of in-flight requests.
#[derive(Debug, Default)]
pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `request_id`.
    ///
    /// Fails if the id is already in flight or the session has ended.
    pub fn register(&self, request_id: &str) -> Result<oneshot::Receiver<Delivery>, RpcError> {
        let mut inner = self.lock();

        if let Some(shutdown) = &inner.shutdown {
            return Err(shutdown.to_error());
        }
        if inner.waiters.contains_key(request_id) {
            return Err(RpcError::DuplicateRequestId(request_id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.insert(request_id.to_string(), tx);
        Ok(rx)
    }

    /// Hand `frame` to the waiter for `request_id` and remove the entry.
    ///
    /// Returns `false` if no waiter is registered under that id.
    pub fn deliver(&self, request_id: &str, frame: String) -> bool {
        let waiter = self.lock().waiters.remove(request_id);
        match waiter {
            // The caller may have given up already; the entry is gone either way.
            Some(tx) => {
                let _ = tx.send(Ok(frame));
                true
            }
            None => false,
        }
    }

    /// Drop the waiter for `request_id` without delivering anything.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.lock().waiters.remove(request_id).is_some()
    }

    /// Fail every waiter and refuse further registrations.
    ///
    /// Returns the number of waiters that were failed.
    pub fn fail_all(&self, kind: &CloseKind) -> usize {
        let shutdown = Shutdown::from_close(kind);
        let waiters: Vec<_> = {
            let mut inner = self.lock();
            inner.shutdown = Some(shutdown.clone());
            inner.waiters.drain().collect()
        };

        let count = waiters.len();
        for (_, tx) in waiters {
            let _ = tx.send(Err(shutdown.to_error()));
        }
        count
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the session has ended.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown.is_some()
    }
}
