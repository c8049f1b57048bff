//! Bidirectional JSON-RPC client for the forwarding server.
//!
//! A [`ForwardingClient`] holds a single persistent WebSocket connection to a
//! forwarding server and multiplexes three kinds of traffic over it:
//!
//! - outbound calls ([`ForwardingClient::call_method`]) correlated to their
//!   responses by a per-call id,
//! - raw outbound payloads ([`ForwardingClient::send_message`]) sent without
//!   any envelope,
//! - inbound, peer-initiated method invocations answered by handlers
//!   registered with [`ForwardingClient::register_method`].
//!
//! Connection lifecycle (connect, disconnect, transport errors) and every
//! inbound frame are observable through a typed event bus
//! ([`ForwardingClient::on`]). A reconnect supervisor driven by a pluggable
//! [`RetryPolicy`] re-establishes the connection after unexpected closes
//! until [`ForwardingClient::disconnect`] is called.

mod client;
mod dispatch;
mod error;
mod events;
mod metrics;
mod pending;
mod registry;
mod retry;

pub use client::{ConnectionState, ForwardingClient, DEFAULT_PATH};
pub use dispatch::Responder;
pub use error::ClientError;
pub use events::{ClientEvent, EventKind, MethodCall, SubscriptionId};
pub use metrics::ClientMetrics;
pub use registry::{MethodHandler, PING_METHOD};
pub use retry::{ExponentialBackoff, FixedInterval, RetryPolicy};

pub use forward_protocol::{ClientIdentity, ClientType, Frame};
