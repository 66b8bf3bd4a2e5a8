//! Signaling transport.
//!
//! The coordinator only needs to push [`SignalMessage`]s out and be handed
//! inbound ones; [`SignalingChannel`] is that seam. [`WsSignalingClient`]
//! is the WebSocket implementation used against `huddle-relay`.

mod client;
mod connection;

use async_trait::async_trait;
use huddle_common::SignalMessage;

pub use client::WsSignalingClient;

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    Closed,
    #[error("failed to encode signal: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound half of a signaling transport. Delivery is at-least-once and
/// unordered across peers.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;

    /// Stop the transport. Further sends fail with [`SignalingError::Closed`].
    async fn close(&self);
}
