//! Typed event bus for client lifecycle and inbound traffic.
//!
//! Push-based: subscribers register callbacks per event kind and are invoked
//! synchronously, in registration order, when events are dispatched. The bus
//! holds strong references to subscribers, so they persist until explicitly
//! removed or the client is dropped.
//!
//! Dispatch operates on a snapshot of the current subscriber list, so a
//! callback may subscribe or unsubscribe (including itself) without
//! deadlocking the bus.

use std::sync::{Arc, Mutex, PoisonError};

use forward_protocol::Frame;
use serde_json::Value;

use crate::dispatch::Responder;

/// A peer-initiated method invocation awaiting an answer.
#[derive(Debug, Clone)]
pub struct MethodCall {
    /// Method name as it appeared on the wire
    pub method: String,
    /// Parameters object (`null` when the peer supplied none)
    pub params: Value,
    /// Handle used to send the response frame for this call
    pub responder: Responder,
}

/// Events observable on the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection established
    Connected,
    /// Connection lost or closed
    Disconnected,
    /// Transport-level error (observational; does not change state by itself)
    Error(String),
    /// Any successfully parsed inbound frame, for raw visibility
    Message(Frame),
    /// Inbound method invocation (also delivered to the method registry)
    MethodCall(MethodCall),
}

impl ClientEvent {
    /// The kind a subscriber declares to receive this event.
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected => EventKind::Disconnected,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Message(_) => EventKind::Message,
            ClientEvent::MethodCall(_) => EventKind::Method,
        }
    }
}

/// Event kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    Message,
    Method,
}

/// Opaque handle identifying a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<Mutex<dyn FnMut(ClientEvent) + Send>>;

struct Subscriber {
    id: u64,
    kind: EventKind,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// In-process publish/subscribe registry, owned by the client instance.
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one event kind.
    ///
    /// Callbacks for the same kind are invoked in registration order.
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: impl FnMut(ClientEvent) + Send + 'static,
    ) -> SubscriptionId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            kind,
            callback: Arc::new(Mutex::new(callback)),
        });
        SubscriptionId(id)
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id.0);
        inner.subscribers.len() != before
    }

    /// Deliver an event to every subscriber registered for its kind.
    ///
    /// Subscribers are invoked synchronously with a clone of the event.
    pub fn dispatch(&self, event: ClientEvent) {
        let kind = event.kind();
        let matching: Vec<Callback> = {
            let inner = self.lock();
            inner
                .subscribers
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in matching {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)(event.clone());
        }
    }

    /// Number of subscribers currently registered for a kind.
    #[cfg(test)]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock().subscribers.iter().filter(|s| s.kind == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
