//! Outstanding-call tracking and call id generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ClientError;

/// Produces locally-unique call ids of the form `<wall-clock-millis>_<counter>`.
///
/// Uniqueness is required within one client instance's lifetime only; the
/// counter increments once per generated id regardless of call outcome.
#[derive(Default)]
pub(crate) struct CallIdGenerator {
    counter: AtomicU64,
}

impl CallIdGenerator {
    pub fn next(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{millis}_{seq}")
    }
}

pub(crate) type CallResult = Result<Value, ClientError>;

struct PendingCall {
    method: String,
    tx: oneshot::Sender<CallResult>,
}

/// Tracks outstanding calls keyed by their correlation id.
///
/// At most one entry exists per live id; resolution is exactly-once and
/// removes the entry.
#[derive(Default)]
pub(crate) struct PendingCalls {
    inner: HashMap<String, PendingCall>,
}

impl PendingCalls {
    /// Register an outstanding call before its request frame is sent.
    pub fn insert(&mut self, id: String, method: String, tx: oneshot::Sender<CallResult>) {
        self.inner.insert(id, PendingCall { method, tx });
    }

    /// Resolve and remove an outstanding call.
    ///
    /// Returns the originating method name when an entry was found, `None`
    /// for unmatched ids (late or unsolicited responses).
    pub fn resolve(&mut self, id: &str, result: CallResult) -> Option<String> {
        let call = self.inner.remove(id)?;
        // The caller may have stopped awaiting; a dead receiver is fine.
        let _ = call.tx.send(result);
        Some(call.method)
    }

    /// Drop an entry without resolving it (send failed after insertion).
    pub fn remove(&mut self, id: &str) -> bool {
        self.inner.remove(id).is_some()
    }

    /// Reject every outstanding call with a connection-closed error.
    ///
    /// Returns the number of calls rejected, for logging.
    pub fn fail_all(&mut self) -> usize {
        let count = self.inner.len();
        for (_, call) in self.inner.drain() {
            let _ = call.tx.send(Err(ClientError::ConnectionClosed));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_unique_and_well_formed() {
        let ids = CallIdGenerator::default();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);

        let (millis, seq) = a.split_once('_').expect("separator");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(seq.parse::<u64>().expect("counter"), 0);
        assert!(b.ends_with("_1"));
    }

    #[tokio::test]
    async fn resolve_completes_the_matching_call_once() {
        let mut pending = PendingCalls::default();
        let (tx, rx) = oneshot::channel();
        pending.insert("id-1".into(), "echo".into(), tx);

        let method = pending.resolve("id-1", Ok(json!({"x": 1})));
        assert_eq!(method.as_deref(), Some("echo"));
        assert!(!pending.contains("id-1"));

        // Second resolution for the same id finds nothing
        assert!(pending.resolve("id-1", Ok(json!(null))).is_none());

        let result = rx.await.expect("sender kept alive");
        assert_eq!(result.expect("success"), json!({"x": 1}));
    }

    #[test]
    fn resolve_unknown_id_is_a_no_op() {
        let mut pending = PendingCalls::default();
        assert!(pending.resolve("ghost", Ok(json!(null))).is_none());
    }

    #[tokio::test]
    async fn fail_all_rejects_every_outstanding_call() {
        let mut pending = PendingCalls::default();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        pending.insert("a".into(), "m1".into(), tx_a);
        pending.insert("b".into(), "m2".into(), tx_b);

        assert_eq!(pending.fail_all(), 2);
        assert_eq!(pending.len(), 0);

        for rx in [rx_a, rx_b] {
            let result = rx.await.expect("sender kept alive");
            assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        }
    }
}
