//! Named method handlers answering peer-initiated calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use forward_protocol::ClientIdentity;

use crate::events::{ClientEvent, EventBus, EventKind, MethodCall};

/// Built-in liveness method, registered at client construction.
pub const PING_METHOD: &str = "flutter.test.ping";

const PING_MESSAGE: &str = "Forwarding client is alive";

/// Handler invoked for inbound calls to a registered method name.
///
/// Handlers may suspend. A returned error is converted into a JSON-RPC error
/// response; it never escapes the registry.
///
/// Any `Fn(Value) -> impl Future<Output = anyhow::Result<Value>>` closure is
/// a handler, so the common case is just an async closure.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Value) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn handle(&self, params: Value) -> anyhow::Result<Value> {
        self(params).await
    }
}

/// Registry of method handlers, routed from `MethodCall` events by name.
///
/// Registrations for the same name accumulate: every registered handler fires
/// for an inbound call, each sending its own response frame. Keeping one
/// handler per method name is the caller's responsibility.
#[derive(Clone, Default)]
pub(crate) struct MethodRegistry {
    handlers: Arc<Mutex<HashMap<String, Vec<Arc<dyn MethodHandler>>>>>,
}

impl MethodRegistry {
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.into())
            .or_default()
            .push(handler);
    }

    fn handlers_for(&self, name: &str) -> Vec<Arc<dyn MethodHandler>> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Run every handler registered for the call's method and respond.
    pub async fn dispatch_call(&self, call: MethodCall) {
        let handlers = self.handlers_for(&call.method);
        if handlers.is_empty() {
            tracing::debug!(method = %call.method, "No handler registered for inbound call");
            return;
        }

        for handler in handlers {
            match handler.handle(call.params.clone()).await {
                Ok(result) => {
                    if let Err(e) = call.responder.ok(result).await {
                        tracing::warn!(method = %call.method, "Failed to send response: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!(method = %call.method, "Method handler failed: {:#}", e);
                    if let Err(e) = call.responder.err(e.to_string()).await {
                        tracing::warn!(
                            method = %call.method,
                            "Failed to send error response: {}",
                            e
                        );
                    }
                }
            }
        }
    }

    /// Subscribe the registry to `MethodCall` events on the bus.
    ///
    /// Handlers run on a spawned task so they may suspend without blocking
    /// inbound dispatch.
    pub fn attach(&self, events: &EventBus) {
        let registry = self.clone();
        events.subscribe(EventKind::Method, move |event| {
            if let ClientEvent::MethodCall(call) = event {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.dispatch_call(call).await;
                });
            }
        });
    }

    /// Register the built-in liveness method for this client's identity.
    pub fn register_ping(&self, identity: ClientIdentity) {
        let handler = move |_params: Value| {
            let identity = identity.clone();
            async move {
                anyhow::Ok(json!({
                    "success": true,
                    "timestamp": chrono::Utc::now().timestamp_millis(),
                    "message": PING_MESSAGE,
                    "clientId": identity.client_id,
                    "clientType": identity.client_type.as_str(),
                }))
            }
        };
        self.register(PING_METHOD, Arc::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Responder;
    use forward_protocol::ClientType;
    use tokio::sync::mpsc;

    fn call_with_channel(method: &str, params: Value) -> (MethodCall, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let call = MethodCall {
            method: method.into(),
            params,
            responder: Responder::new("call-1".into(), tx),
        };
        (call, rx)
    }

    #[tokio::test]
    async fn successful_handler_sends_result_frame() {
        let registry = MethodRegistry::default();
        registry.register(
            "echo",
            Arc::new(|params: Value| async move { anyhow::Ok(params) }),
        );

        let (call, mut rx) = call_with_channel("echo", json!({"x": 1}));
        registry.dispatch_call(call).await;

        let sent = rx.recv().await.expect("response frame");
        assert_eq!(sent, r#"{"jsonrpc":"2.0","id":"call-1","result":{"x":1}}"#);
    }

    #[tokio::test]
    async fn failing_handler_sends_error_frame() {
        let registry = MethodRegistry::default();
        registry.register(
            "explode",
            Arc::new(|_params: Value| async move {
                Err::<Value, anyhow::Error>(anyhow::anyhow!("handler blew up"))
            }),
        );

        let (call, mut rx) = call_with_channel("explode", Value::Null);
        registry.dispatch_call(call).await;

        let sent = rx.recv().await.expect("error frame");
        assert_eq!(
            sent,
            r#"{"jsonrpc":"2.0","id":"call-1","error":{"message":"handler blew up"}}"#
        );
    }

    #[tokio::test]
    async fn unregistered_method_sends_nothing() {
        let registry = MethodRegistry::default();
        let (call, mut rx) = call_with_channel("missing", Value::Null);
        registry.dispatch_call(call).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_registrations_each_respond() {
        let registry = MethodRegistry::default();
        for _ in 0..2 {
            registry.register(
                "twice",
                Arc::new(|_params: Value| async move { anyhow::Ok(json!("hi")) }),
            );
        }

        let (call, mut rx) = call_with_channel("twice", Value::Null);
        registry.dispatch_call(call).await;

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ping_reports_identity_and_liveness() {
        let registry = MethodRegistry::default();
        let identity = ClientIdentity::new("client-123", ClientType::Flutter);
        registry.register_ping(identity);

        let (call, mut rx) = call_with_channel(PING_METHOD, json!({"anything": "goes"}));
        registry.dispatch_call(call).await;

        let sent = rx.recv().await.expect("ping response");
        let frame: Value = serde_json::from_str(&sent).expect("valid json");
        let result = &frame["result"];
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["clientId"], json!("client-123"));
        assert_eq!(result["clientType"], json!("flutter"));
        assert_eq!(result["message"], json!(PING_MESSAGE));
        assert!(result["timestamp"].is_i64());
    }
}
