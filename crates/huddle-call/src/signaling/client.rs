//! Public handle for the relay WebSocket.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_common::SignalMessage;
use huddle_config::schema::SignalingConfig;
use tokio::sync::{mpsc, RwLock};

use super::connection::{connection_loop, SignalingCommand};
use super::{SignalingChannel, SignalingError};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle to the background relay connection.
///
/// Sends are queued to the connection task, so they never block on the
/// network. Messages sent while the link is down are flushed after the
/// next successful reconnect, which also repeats the last `join`.
pub struct WsSignalingClient {
    command_tx: mpsc::Sender<SignalingCommand>,
    connected: Arc<RwLock<bool>>,
}

impl WsSignalingClient {
    /// Start the background connection. Returns `(client, inbound)`.
    pub fn connect(config: SignalingConfig) -> (Self, mpsc::Receiver<SignalMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, inbound_tx, command_rx));

        (client, inbound_rx)
    }

    /// Whether the WebSocket is currently up.
    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingClient {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        self.command_tx
            .send(SignalingCommand::Send(message))
            .await
            .map_err(|_| SignalingError::Closed)
    }

    async fn close(&self) {
        let _ = self.command_tx.send(SignalingCommand::Close).await;
    }
}
