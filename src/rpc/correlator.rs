//! Inbound frame routing.
//!
//! The [`Correlator`] sits on the receiving side of a client connection. It
//! reads only the envelope header of each frame and hands the raw frame to
//! whichever waiter registered that `request_id`.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::RpcError;
use super::message::EnvelopeHeader;
use super::pending::{Delivery, PendingTable};
use crate::transport::{CloseKind, FrameHandler};

/// Routes response frames to pending requests.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: PendingTable,
}

impl Correlator {
    /// Create a correlator with an empty pending table.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a waiter for `request_id`.
    pub fn register(&self, request_id: &str) -> Result<oneshot::Receiver<Delivery>, RpcError> {
        self.pending.register(request_id)
    }

    /// Forget a waiter (deadline expired or caller gone).
    pub fn cancel(&self, request_id: &str) -> bool {
        self.pending.cancel(request_id)
    }

    /// Route one inbound frame.
    ///
    /// Returns `true` if the frame reached a waiter. Frames that cannot be
    /// decoded or match no waiter are logged and dropped.
    pub fn route(&self, frame: String) -> bool {
        let header = match EnvelopeHeader::decode(&frame) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return false;
            }
        };

        let request_id = header.request_id;
        if self.pending.deliver(&request_id, frame) {
            debug!(request_id = %request_id, request_type = %header.request_type, "response routed");
            true
        } else {
            warn!(request_id = %request_id, request_type = %header.request_type, "no pending request for response");
            false
        }
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Whether the session behind this correlator has ended.
    pub fn is_shut_down(&self) -> bool {
        self.pending.is_shut_down()
    }
}

impl FrameHandler for Correlator {
    fn on_frame(&self, frame: String) {
        self.route(frame);
    }

    fn on_close(&self, kind: &CloseKind) {
        let failed = self.pending.fail_all(kind);
        if failed > 0 {
            debug!(failed, %kind, "failed pending requests");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, value: &str) -> String {
        format!(r#"{{"request_id":"{id}","request_type":"ECHO","value":"{value}"}}"#)
    }

    #[tokio::test]
    async fn test_route_to_matching_waiter() {
        let correlator = Correlator::new();
        let rx = correlator.register("r1").unwrap();

        assert!(correlator.route(frame("r1", "v")));
        assert_eq!(rx.await.unwrap().unwrap(), frame("r1", "v"));
        assert_eq!(correlator.in_flight(), 0);
    }

    #[test]
    fn test_unmatched_and_malformed_frames_dropped() {
        let correlator = Correlator::new();
        let _rx = correlator.register("known").unwrap();

        assert!(!correlator.route(frame("stranger", "v")));
        assert!(!correlator.route("{broken".into()));
        assert!(!correlator.route(r#"{"value":"no id"}"#.into()));
        assert_eq!(correlator.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let correlator = Correlator::new();
        let ids: Vec<String> = (0..16).map(|i| format!("id-{i}")).collect();
        let receivers: Vec<_> = ids
            .iter()
            .map(|id| correlator.register(id).unwrap())
            .collect();

        for id in ids.iter().rev() {
            assert!(correlator.route(frame(id, id)));
        }

        for (id, rx) in ids.iter().zip(receivers) {
            assert_eq!(rx.await.unwrap().unwrap(), frame(id, id));
        }
    }

    #[tokio::test]
    async fn test_concurrent_routing() {
        let correlator = Correlator::new();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let id = format!("c-{i}");
            let rx = correlator.register(&id).unwrap();
            tasks.push(tokio::spawn(async move {
                let got = rx.await.unwrap().unwrap();
                assert_eq!(got, frame(&id, &id));
            }));
        }

        let router = correlator.clone();
        tokio::spawn(async move {
            for i in (0..64).rev() {
                let id = format!("c-{i}");
                router.route(frame(&id, &id));
            }
        })
        .await
        .unwrap();

        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_close_fails_waiters() {
        let correlator = Correlator::new();
        let rx = correlator.register("w").unwrap();

        correlator.on_close(&CloseKind::Unexpected {
            code: None,
            reason: "reset".into(),
        });

        assert!(matches!(rx.await.unwrap(), Err(RpcError::ConnectionLost(_))));
        assert!(correlator.is_shut_down());
    }
}
