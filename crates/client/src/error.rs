//! Client-side error types.
//!
//! These are errors surfaced to callers of the client API, distinct from
//! error payloads travelling inside response frames (those are wire data,
//! see `forward_protocol::ErrorPayload`).

/// Errors surfaced by the forwarding client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An operation requiring a live connection was invoked while not connected
    #[error("not connected to forwarding server")]
    NotConnected,

    /// Opening the WebSocket connection failed
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The connect endpoint could not be built from the supplied host/port/path
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Queueing an outbound frame failed (transport gone mid-operation)
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// The connection closed while a call was still outstanding
    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    /// The peer answered a call with an error payload
    #[error("call failed: {message}")]
    Call { message: String },

    /// A payload could not be serialized to JSON
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
