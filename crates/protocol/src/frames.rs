//! JSON-RPC 2.0 frame shapes exchanged with the forwarding server.
//!
//! Exactly two shapes exist on the wire: a request carrying `method` + `id`,
//! and a response carrying `id` with either a `result` or an `error`.
//! Classification is strictly by field presence, which the untagged enum
//! below encodes: the `Request` variant is tried first because it is the
//! only one requiring `method`.
//!
//! ## Versioning Policy
//!
//! - The `jsonrpc` field is always emitted outbound and tolerated absent
//!   inbound (defaulting to `"2.0"`)
//! - Unknown fields on either shape are ignored for forward compatibility

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope version stamped on every outbound frame.
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

const UNKNOWN_ERROR: &str = "Unknown error";

/// A peer-initiated or outbound method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Correlation id linking this request to its eventual response
    pub id: String,
    /// Method name (e.g. `flutter.test.ping`)
    pub method: String,
    /// Parameters object; `null` when the caller supplied none
    #[serde(default)]
    pub params: Value,
}

/// A response to a prior request, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Echoed correlation id
    pub id: String,
    /// Result payload (success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Error body inside a response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Human-readable message, substituting a fixed default when the peer
    /// omitted the field.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(UNKNOWN_ERROR)
    }
}

/// A single wire frame, classified by field presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
}

impl Frame {
    /// Build an outbound request frame.
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Frame::Request(RequestFrame {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a success response frame.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Frame::Response(ResponseFrame {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            result: Some(result),
            error: None,
        })
    }

    /// Build an error response frame.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Frame::Response(ResponseFrame {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            result: None,
            error: Some(ErrorPayload::new(message)),
        })
    }
}
