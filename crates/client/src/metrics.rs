//! Counters for frames the dispatcher drops by design.
//!
//! Malformed inbound frames and responses with no matching pending call are
//! non-fatal and intentionally silent; these counters make those drops
//! observable without turning them into events.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ClientMetrics {
    malformed_frames: AtomicU64,
    unmatched_responses: AtomicU64,
}

impl ClientMetrics {
    pub(crate) fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unmatched_response(&self) {
        self.unmatched_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound frames dropped because they failed to deserialize.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Response frames dropped because no pending call matched their id.
    pub fn unmatched_responses(&self) -> u64 {
        self.unmatched_responses.load(Ordering::Relaxed)
    }
}
