//! Per-connection handler: wait for `join`, register, then route frames.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use huddle_common::{PeerId, RoomId, SignalMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::rooms::{Outbox, RoomStore};
use crate::server::RelaySettings;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

const SHARE_REFUSED: &str = "Another user is already sharing their screen";

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Who this socket joined as.
struct Joined {
    room: RoomId,
    user: PeerId,
    conn_id: u64,
}

enum Flow {
    Continue,
    Leave,
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    rooms: RoomStore,
    settings: RelaySettings,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame must be a join.
    let Some((room, user)) = read_join(&mut stream, addr, settings.join_timeout).await else {
        return;
    };
    let joined = Joined {
        room,
        user,
        conn_id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
    };

    // 2. Register and announce to the rest of the room. A rejoin is
    // announced as a departure first.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let arrival = rooms
        .join(&joined.room, &joined.user, joined.conn_id, tx)
        .await;

    if let Some(replaced) = &arrival.replaced {
        if replaced.was_sharer {
            tracing::info!(room = %joined.room, user = %joined.user, "Rejoining sharer, slot cleared");
        }
        broadcast(
            &arrival.others,
            &SignalMessage::UserLeft {
                room_id: joined.room.clone(),
                user_id: joined.user.clone(),
            },
        )
        .await;
    }

    let members = rooms.member_count(&joined.room).await;
    tracing::info!(
        peer = %addr,
        room = %joined.room,
        user = %joined.user,
        members = members,
        "Client joined"
    );

    broadcast(
        &arrival.others,
        &SignalMessage::UserJoined {
            room_id: joined.room.clone(),
            user_id: joined.user.clone(),
        },
    )
    .await;

    // 3. Routing loop.
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => {
                    if sink.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                // Our outbox was dropped from the store: a rejoin replaced us.
                None => {
                    tracing::debug!(room = %joined.room, user = %joined.user, "Connection superseded");
                    break;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Flow::Leave = route(&text, &joined, &rooms, &settings, &mut sink).await {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(peer = %addr, error = %e, "WS error");
                    break;
                }
                _ => {}
            },
        }
    }

    // 4. Cleanup. A superseded socket no longer owns the membership.
    tracing::info!(peer = %addr, room = %joined.room, user = %joined.user, "Client disconnected");

    let departure = rooms
        .leave(&joined.room, &joined.user, joined.conn_id)
        .await;
    let room_count = rooms.room_count().await;
    tracing::debug!(rooms = room_count, "Room store size");

    if let Some(departure) = departure {
        if departure.was_sharer {
            tracing::info!(room = %joined.room, user = %joined.user, "Sharer left, slot cleared");
        }
        broadcast(
            &departure.remaining,
            &SignalMessage::UserLeft {
                room_id: joined.room.clone(),
                user_id: joined.user.clone(),
            },
        )
        .await;
    }
}

/// Read and parse the first frame as a `join`.
async fn read_join(
    stream: &mut WsSource,
    addr: SocketAddr,
    wait: Duration,
) -> Option<(RoomId, PeerId)> {
    let frame = tokio::time::timeout(wait, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match SignalMessage::from_json(&text) {
            Ok(SignalMessage::Join { room_id, user_id }) => Some((room_id, user_id)),
            Ok(other) => {
                tracing::warn!(peer = %addr, event = other.event_name(), "Expected join first");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid join message");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text join, got non-text frame");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during join");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before join");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout_secs = wait.as_secs(), "Join timeout");
            None
        }
    }
}

/// Dispatch one inbound frame from a joined client.
async fn route(
    text: &str,
    joined: &Joined,
    rooms: &RoomStore,
    settings: &RelaySettings,
    sink: &mut WsSink,
) -> Flow {
    let message = match SignalMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(room = %joined.room, user = %joined.user, error = %e, "Dropping unparseable frame");
            return Flow::Continue;
        }
    };

    match &message {
        SignalMessage::ScreenOffer(payload) => {
            if settings.exclusive_screen_share {
                if let Some(sharer) = rooms.sharer(&joined.room).await {
                    if sharer != joined.user {
                        tracing::info!(
                            room = %joined.room,
                            user = %joined.user,
                            sharer = %sharer,
                            "Refusing second screen sharer"
                        );
                        let refusal = SignalMessage::ScreenSharingError {
                            message: SHARE_REFUSED.into(),
                        };
                        let _ = send_message(sink, &refusal).await;
                        return Flow::Continue;
                    }
                }
            }

            if forward(text, &payload.target_user_id, joined, rooms).await
                && rooms.mark_sharer(&joined.room, &joined.user).await
            {
                tracing::info!(room = %joined.room, user = %joined.user, "Screen share started");
                let started = SignalMessage::ScreenSharingStarted {
                    room_id: joined.room.clone(),
                    user_id: joined.user.clone(),
                };
                announce(&started, joined, rooms, sink).await;
            }
        }
        SignalMessage::Offer(_)
        | SignalMessage::Answer(_)
        | SignalMessage::IceCandidate(_)
        | SignalMessage::ScreenAnswer(_)
        | SignalMessage::ScreenIceCandidate(_) => {
            if let Some(target) = message.target() {
                forward(text, target, joined, rooms).await;
            }
        }
        SignalMessage::ScreenShareStopped { .. } => {
            if rooms.release_sharer(&joined.room, &joined.user).await {
                tracing::info!(room = %joined.room, user = %joined.user, "Screen share stopped");
                let stopped = SignalMessage::ScreenShareStopped {
                    room_id: joined.room.clone(),
                    user_id: joined.user.clone(),
                };
                announce(&stopped, joined, rooms, sink).await;
            }
        }
        SignalMessage::DisconnectCall { .. } => return Flow::Leave,
        SignalMessage::Join { room_id, .. } => {
            tracing::debug!(room = %joined.room, requested = %room_id, "Ignoring repeated join");
        }
        other => {
            tracing::debug!(event = other.event_name(), "Ignoring relay-originated event from client");
        }
    }
    Flow::Continue
}

/// Forward the raw frame to `target` in the sender's room.
async fn forward(text: &str, target: &PeerId, joined: &Joined, rooms: &RoomStore) -> bool {
    match rooms.member_tx(&joined.room, target).await {
        Some(tx) => {
            if tx.send(text.to_owned()).await.is_err() {
                tracing::debug!(room = %joined.room, target = %target, "Target channel closed");
                return false;
            }
            true
        }
        None => {
            tracing::warn!(
                room = %joined.room,
                user = %joined.user,
                target = %target,
                "Unknown target, dropping frame"
            );
            false
        }
    }
}

/// Send a notice to the whole room, the sender included.
async fn announce(message: &SignalMessage, joined: &Joined, rooms: &RoomStore, sink: &mut WsSink) {
    let others = rooms.others(&joined.room, &joined.user).await;
    broadcast(&others, message).await;
    let _ = send_message(sink, message).await;
}

async fn broadcast(targets: &[Outbox], message: &SignalMessage) {
    if targets.is_empty() {
        return;
    }
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(event = message.event_name(), error = %e, "Failed to encode notice");
            return;
        }
    };
    for tx in targets {
        let _ = tx.send(json.clone()).await;
    }
}

/// Send a SignalMessage as a JSON text frame.
async fn send_message(sink: &mut WsSink, message: &SignalMessage) -> Result<(), tungstenite::Error> {
    let json = message
        .to_json()
        .map_err(|e| tungstenite::Error::Io(std::io::Error::other(e)))?;
    sink.send(Message::Text(json.into())).await
}
