//! Wire types for the forwarding-server protocol.
//!
//! The forwarding server relays JSON-RPC 2.0 calls between connected clients
//! over WebSocket text frames. This crate defines the frame shapes exchanged
//! on the wire and the identity every client presents when connecting. It is
//! deliberately free of any runtime dependencies so both client and server
//! implementations can share it.

mod frames;
mod identity;

pub use frames::{ErrorPayload, Frame, RequestFrame, ResponseFrame, JSONRPC_VERSION};
pub use identity::{ClientIdentity, ClientType};
