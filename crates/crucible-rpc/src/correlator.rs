//! Outbound call correlation
//!
//! Every outbound call with a valid id gets a pending slot keyed by that id.
//! The slot is settled exactly once: by the matching inbound response, or by
//! an Invalid response (-32060) once the deadline passes. Either way the slot
//! is gone afterwards, so late responses fall on the floor.

use crucible_protocol::{validate, RequestId, Response, RpcError, JSONRPC_VERSION};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Slot {
    /// Distinguishes successive calls that reuse the same id.
    ticket: u64,
    tx: oneshot::Sender<Response>,
}

pub struct Correlator {
    pending: DashMap<RequestId, Slot>,
    next_ticket: AtomicU64,
    timeout: Duration,
}

/// Outcome of registering one outbound message.
pub enum Subscription<'a> {
    /// Known without waiting: `None` for a notification, or a local error.
    Settled(Option<Response>),
    Waiting(PendingCall<'a>),
}

impl Subscription<'_> {
    pub async fn resolve(self) -> Option<Response> {
        match self {
            Self::Settled(response) => response,
            Self::Waiting(call) => Some(call.wait().await),
        }
    }
}

/// A registered call awaiting its response. Dropping it releases the slot.
pub struct PendingCall<'a> {
    correlator: &'a Correlator,
    id: RequestId,
    ticket: u64,
    deadline: Instant,
    rx: Option<oneshot::Receiver<Response>>,
}

impl PendingCall<'_> {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub async fn wait(mut self) -> Response {
        if let Some(rx) = self.rx.take() {
            if let Ok(Ok(response)) = tokio::time::timeout_at(self.deadline, rx).await {
                return response;
            }
        }
        debug!(
            id = %self.id,
            timeout_ms = self.correlator.timeout.as_millis() as u64,
            "No response before deadline"
        );
        RpcError::invalid_response().into_response(Some(self.id.clone()))
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.correlator
            .pending
            .remove_if(&self.id, |_, slot| slot.ticket == ticket);
    }
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            next_ticket: AtomicU64::new(0),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }

    /// Validate an outbound message and, if it is a call, arm its slot and
    /// deadline.
    ///
    /// Registration is synchronous so the slot exists before the message is
    /// written; a fast remote can never answer an unregistered call.
    pub fn register(&self, message: &Value) -> Subscription<'_> {
        let Some(fields) = validate::as_message(message) else {
            return Subscription::Settled(Some(Response::invalid_request("Uncompliant object")));
        };
        if !validate::is_request(fields) {
            return Subscription::Settled(Some(Response::invalid_request("Malformed JSON-RPC")));
        }
        if fields.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Subscription::Settled(Some(Response::invalid_request("Unsupported version")));
        }

        let Some(raw_id) = fields.get("id") else {
            return Subscription::Settled(None);
        };
        let Some(id) = RequestId::from_value(raw_id) else {
            return Subscription::Settled(Some(Response::invalid_request("Invalid identifier")));
        };

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let rx = match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(%id, "Call identifier already in flight");
                return Subscription::Settled(Some(Response::invalid_request(
                    "Duplicate identifier",
                )));
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(Slot { ticket, tx });
                rx
            }
        };

        Subscription::Waiting(PendingCall {
            correlator: self,
            id,
            ticket,
            deadline: Instant::now() + self.timeout,
            rx: Some(rx),
        })
    }

    /// Register and wait in one step.
    ///
    /// Resolves to `None` for notifications, to an immediate error for
    /// malformed messages, and otherwise to the remote response or a timeout.
    pub async fn subscribe(&self, message: &Value) -> Option<Response> {
        self.register(message).resolve().await
    }

    /// Settle the pending call matching an inbound response.
    ///
    /// Responses with a `null` id, or an id nobody is waiting for, are
    /// dropped.
    pub fn publish(&self, response: Response) {
        let Some(id) = response.id().cloned() else {
            debug!("Dropping response without identifier");
            return;
        };
        match self.pending.remove(&id) {
            Some((_, slot)) => {
                // The caller may have given up in the meantime.
                let _ = slot.tx.send(response);
            }
            None => debug!(%id, "Dropping response for unknown call"),
        }
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_protocol::{INVALID_REQUEST, INVALID_RESPONSE};
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn call(id: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": "addition", "params": [2, 2]})
    }

    fn cause(response: &Response) -> Value {
        let err = response.error().unwrap();
        assert_eq!(err.code, INVALID_REQUEST);
        assert_eq!(response.id(), None);
        err.data.clone().unwrap()
    }

    #[tokio::test]
    async fn test_publish_settles_pending_call() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let Subscription::Waiting(pending) = correlator.register(&call(json!("a"))) else {
            panic!("expected a pending call");
        };
        assert!(correlator.is_pending(&RequestId::from("a")));

        correlator.publish(Response::success(RequestId::from("a"), 4));
        let response = pending.wait().await;
        assert_eq!(response.result(), Some(&json!(4)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_stays_pending_until_published() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let request = call(json!("p"));
        let mut subscription = task::spawn(correlator.subscribe(&request));

        assert_pending!(subscription.poll());
        assert_pending!(subscription.poll());
        correlator.publish(Response::success(RequestId::from("p"), 1));

        assert!(subscription.is_woken());
        let response = assert_ready!(subscription.poll()).unwrap();
        assert_eq!(response.result(), Some(&json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_invalid_response() {
        let correlator = Correlator::new(Duration::from_millis(1000));
        let response = correlator.subscribe(&call(json!(7))).await.unwrap();

        let err = response.error().unwrap();
        assert_eq!(err.code, INVALID_RESPONSE);
        assert_eq!(err.message, "Invalid response");
        assert_eq!(response.id(), Some(&RequestId::Number(7)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_publish_is_dropped() {
        let correlator = Correlator::new(Duration::from_millis(10));
        let response = correlator.subscribe(&call(json!("late"))).await.unwrap();
        assert!(response.error().is_some());

        correlator.publish(Response::success(RequestId::from("late"), 1));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_resolves_to_none() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let note = json!({"jsonrpc": "2.0", "method": "addition"});
        assert_eq!(correlator.subscribe(&note).await, None);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_structural_failures() {
        let correlator = Correlator::new(Duration::from_secs(1));

        let response = correlator.subscribe(&json!(42)).await.unwrap();
        assert_eq!(cause(&response), "Uncompliant object");

        let response = correlator
            .subscribe(&json!({"jsonrpc": "2.0", "id": 1, "method": "a", "result": 1}))
            .await
            .unwrap();
        assert_eq!(cause(&response), "Malformed JSON-RPC");

        let response = correlator
            .subscribe(&json!({"jsonrpc": "1.0", "id": 1, "method": "a"}))
            .await
            .unwrap();
        assert_eq!(cause(&response), "Unsupported version");

        let response = correlator.subscribe(&call(json!(null))).await.unwrap();
        assert_eq!(cause(&response), "Invalid identifier");

        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let first = correlator.register(&call(json!(1)));
        let second = correlator.subscribe(&call(json!(1))).await.unwrap();
        assert_eq!(cause(&second), "Duplicate identifier");

        correlator.publish(Response::success(RequestId::Number(1), 4));
        assert_eq!(first.resolve().await.unwrap().result(), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_dropping_pending_call_releases_slot() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let pending = correlator.register(&call(json!("gone")));
        assert_eq!(correlator.pending_count(), 1);
        drop(pending);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_drop_keeps_newer_slot() {
        let correlator = Correlator::new(Duration::from_secs(1));
        let Subscription::Waiting(first) = correlator.register(&call(json!(5))) else {
            panic!("expected a pending call");
        };
        correlator.publish(Response::success(RequestId::Number(5), 1));

        // id 5 is free again and can be reused before the first waiter is dropped
        let second = correlator.register(&call(json!(5)));
        assert!(matches!(second, Subscription::Waiting(_)));
        drop(first);
        assert!(correlator.is_pending(&RequestId::Number(5)));
    }

    #[test]
    fn test_publish_unknown_or_null_id_is_noop() {
        let correlator = Correlator::new(Duration::from_secs(1));
        correlator.publish(Response::success(RequestId::from("nobody"), 1));
        correlator.publish(Response::invalid_request("Empty batch"));
        assert_eq!(correlator.pending_count(), 0);
    }
}
