//! Inbound frame dispatch.
//!
//! Every text frame from the socket passes through [`handle_inbound`]:
//! parse, publish as a generic `Message` event, then route by shape —
//! requests become `MethodCall` events carrying a [`Responder`], responses
//! resolve their pending call. Malformed frames and unmatched response ids
//! are dropped after logging and counting; neither is fatal.

use forward_protocol::Frame;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::ClientError;
use crate::events::{ClientEvent, EventBus, MethodCall};
use crate::metrics::ClientMetrics;
use crate::pending::PendingCalls;

/// Handle for answering one inbound method call.
///
/// Cloneable so a call can be observed by several subscribers; if more than
/// one of them responds, more than one response frame is sent. Registering at
/// most one handler per method name is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Responder {
    id: String,
    outbound: mpsc::Sender<String>,
}

impl Responder {
    pub(crate) fn new(id: String, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    /// Correlation id of the call being answered.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send a success response carrying `result`.
    pub async fn ok(&self, result: Value) -> Result<(), ClientError> {
        self.send_frame(Frame::success(self.id.clone(), result)).await
    }

    /// Send an error response carrying `message`.
    pub async fn err(&self, message: impl Into<String>) -> Result<(), ClientError> {
        self.send_frame(Frame::error(self.id.clone(), message)).await
    }

    async fn send_frame(&self, frame: Frame) -> Result<(), ClientError> {
        let text = serde_json::to_string(&frame)?;
        self.outbound
            .send(text)
            .await
            .map_err(|_| ClientError::SendFailed("connection closed".into()))
    }
}

/// Parse, classify, and route one inbound text frame.
pub(crate) async fn handle_inbound(
    text: &str,
    pending: &Mutex<PendingCalls>,
    events: &EventBus,
    outbound: &mpsc::Sender<String>,
    metrics: &ClientMetrics,
) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            metrics.record_malformed_frame();
            tracing::warn!("Dropping malformed inbound frame: {}", e);
            return;
        }
    };

    // Raw visibility for observers before any routing
    events.dispatch(ClientEvent::Message(frame.clone()));

    match frame {
        Frame::Request(req) => {
            let responder = Responder::new(req.id, outbound.clone());
            events.dispatch(ClientEvent::MethodCall(MethodCall {
                method: req.method,
                params: req.params,
                responder,
            }));
        }
        Frame::Response(resp) => {
            let result = match resp.error {
                Some(error) => Err(ClientError::Call {
                    message: error.message().to_string(),
                }),
                None => Ok(resp.result.unwrap_or(Value::Null)),
            };

            let resolved = pending.lock().await.resolve(&resp.id, result);
            match resolved {
                Some(method) => {
                    tracing::trace!(id = %resp.id, method = %method, "Resolved pending call");
                }
                None => {
                    metrics.record_unmatched_response();
                    tracing::debug!(
                        id = %resp.id,
                        "Response received for unknown call id - dropping"
                    );
                }
            }
        }
    }
}
