//! Background WebSocket connection loop with auto-reconnect.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_common::SignalMessage;
use huddle_config::schema::SignalingConfig;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Frames kept while the link is down.
const MAX_PENDING: usize = 256;

pub(crate) enum SignalingCommand {
    Send(SignalMessage),
    Close,
}

#[derive(Debug, PartialEq, Eq)]
enum LinkOutcome {
    /// Dropped by the network or the relay; reconnect.
    Lost,
    /// Closed on request; stop.
    Closed,
}

/// What survives a reconnect.
#[derive(Default)]
struct LinkState {
    last_join: Option<String>,
    pending: VecDeque<String>,
}

impl LinkState {
    /// Serialize `message`, remembering the latest `join` for replay.
    fn encode(&mut self, message: &SignalMessage) -> Option<String> {
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = message.event_name(), error = %e, "Failed to encode signal");
                return None;
            }
        };
        match message {
            SignalMessage::Join { .. } => self.last_join = Some(frame.clone()),
            SignalMessage::DisconnectCall { .. } => self.last_join = None,
            _ => {}
        }
        Some(frame)
    }

    /// Hold a frame until the link is back. A `join` is not queued because
    /// the reconnect replays it anyway.
    fn queue(&mut self, message: &SignalMessage) {
        let Some(frame) = self.encode(message) else {
            return;
        };
        if matches!(message, SignalMessage::Join { .. }) {
            return;
        }
        if self.pending.len() >= MAX_PENDING {
            warn!("Signaling queue full, dropping oldest frame");
            self.pending.pop_front();
        }
        self.pending.push_back(frame);
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the relay connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: SignalingConfig,
    connected: Arc<RwLock<bool>>,
    inbound_tx: mpsc::Sender<SignalMessage>,
    mut command_rx: mpsc::Receiver<SignalingCommand>,
) {
    let mut link = LinkState::default();
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        info!(url = %config.url, "Connecting to signaling relay");

        match tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(&config.url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let outcome = run_link(ws_stream, &mut link, &inbound_tx, &mut command_rx).await;
                *connected.write().await = false;
                if outcome == LinkOutcome::Closed {
                    info!("Signaling connection closed");
                    return;
                }
                warn!("Signaling connection lost");
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling connect timed out"
                );
            }
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        let wait = Duration::from_secs(reconnect_delay);
        if !wait_for_reconnect(wait, &mut link, &mut command_rx).await {
            info!("Signaling closed while disconnected");
            return;
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

/// Sleep out the backoff while still accepting commands. Returns `false`
/// when the client asked to close.
async fn wait_for_reconnect(
    wait: Duration,
    link: &mut LinkState,
    command_rx: &mut mpsc::Receiver<SignalingCommand>,
) -> bool {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => match cmd {
                Some(SignalingCommand::Send(message)) => link.queue(&message),
                Some(SignalingCommand::Close) | None => return false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

async fn run_link(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    link: &mut LinkState,
    inbound_tx: &mpsc::Sender<SignalMessage>,
    command_rx: &mut mpsc::Receiver<SignalingCommand>,
) -> LinkOutcome {
    let (mut write, mut read) = ws_stream.split();

    // Rejoin before flushing anything queued while offline.
    if let Some(join) = link.last_join.clone() {
        if write.send(WsMessage::Text(join.into())).await.is_err() {
            return LinkOutcome::Lost;
        }
        info!("Re-sent join after reconnect");
    }
    while let Some(frame) = link.pending.pop_front() {
        if write.send(WsMessage::Text(frame.clone().into())).await.is_err() {
            link.pending.push_front(frame);
            return LinkOutcome::Lost;
        }
    }

    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(SignalingCommand::Send(message)) => {
                    let Some(frame) = link.encode(&message) else {
                        continue;
                    };
                    if write.send(WsMessage::Text(frame.clone().into())).await.is_err() {
                        if !matches!(message, SignalMessage::Join { .. }) {
                            link.pending.push_back(frame);
                        }
                        return LinkOutcome::Lost;
                    }
                    debug!(event = message.event_name(), "Signal sent");
                }
                Some(SignalingCommand::Close) | None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return LinkOutcome::Closed;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match SignalMessage::from_json(&text) {
                    Ok(message) => {
                        if inbound_tx.send(message).await.is_err() {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return LinkOutcome::Closed;
                        }
                    }
                    Err(e) => debug!(error = %e, "Unrecognized signaling frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Relay closed connection");
                    return LinkOutcome::Lost;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return LinkOutcome::Lost;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
