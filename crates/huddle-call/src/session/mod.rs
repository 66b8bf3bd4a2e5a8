//! One room session: the connection coordinator.
//!
//! All work for a session (inbound signals, connection callbacks, timers and
//! the UI's own calls) goes through one [`CallSession`]. Handlers may
//! interleave at await points but never run in parallel on the shared
//! state: every check-then-act on the registry happens under one lock, and
//! every handler re-checks that its connection is still the same generation
//! after it resumes.

mod lifecycle;
mod negotiation;
mod screen_share;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use huddle_common::{PeerId, RoomId, SignalMessage};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionFactory, ConnectionSignal};
use crate::identity::LocalIdentity;
use crate::media::{LocalStream, LocalTrack, MediaSourceProvider, RemoteStream};
use crate::registry::{
    ConnectionClass, ConnectionKey, ConnectionRegistry, InFlightSet, NegotiationState,
    PeerConnectionRecord,
};
use crate::signaling::SignalingChannel;

pub use types::{CallConfig, CallError, CallEvent, RemovalReason};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything the handlers mutate, under one lock.
#[derive(Default)]
struct SessionState {
    registry: ConnectionRegistry,
    in_flight: InFlightSet,
    local_media: LocalStream,
    muted: bool,
    video_off: bool,
    /// Display track while we are sharing.
    share: Option<LocalTrack>,
    last_generation: u64,
}

impl SessionState {
    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }

    /// Drop the connection under `key` if it is still `generation`, along
    /// with its in-flight mark.
    fn retire(&mut self, key: &ConnectionKey, generation: u64) -> Option<PeerConnectionRecord> {
        match self.registry.generation_of(key) {
            Some(current) if current == generation => {
                self.in_flight.remove(key);
                self.registry.remove(&key.peer, key.class)
            }
            Some(_) => None,
            None => {
                self.in_flight.remove(key);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Call Session
// ---------------------------------------------------------------------------

/// Coordinator for one room.
pub struct CallSession {
    identity: LocalIdentity,
    room: RoomId,
    config: CallConfig,
    signaling: Arc<dyn SignalingChannel>,
    media: Arc<dyn MediaSourceProvider>,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<SessionState>,
    disconnected: AtomicBool,
    shutdown: Notify,
    /// Event sender.
    event_tx: mpsc::Sender<CallEvent>,
    /// Connection callbacks and timers feed back through here.
    conn_tx: mpsc::UnboundedSender<ConnectionSignal>,
    conn_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionSignal>>>,
}

/// What woke the session loop.
enum Step {
    Signal(SignalMessage),
    Connection(ConnectionSignal),
    Settled,
    InboundClosed,
    Shutdown,
}

impl CallSession {
    pub fn new(
        config: CallConfig,
        identity: LocalIdentity,
        room: RoomId,
        signaling: Arc<dyn SignalingChannel>,
        media: Arc<dyn MediaSourceProvider>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> (Self, mpsc::Receiver<CallEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let session = Self {
            identity,
            room,
            config,
            signaling,
            media,
            factory,
            state: Mutex::new(SessionState::default()),
            disconnected: AtomicBool::new(false),
            shutdown: Notify::new(),
            event_tx,
            conn_tx,
            conn_rx: Mutex::new(Some(conn_rx)),
        };
        (session, event_rx)
    }

    /// Drive the session until it is disconnected or `inbound` ends.
    ///
    /// Each inbound signal and connection callback becomes its own handler
    /// future; they are polled together on this task, so a handler blocked
    /// on offer creation does not hold up unrelated peers.
    pub async fn run(&self, mut inbound: mpsc::Receiver<SignalMessage>) {
        let Some(mut conn_rx) = self.conn_rx.lock().await.take() else {
            warn!(room = %self.room, "Session loop already running");
            return;
        };
        let mut pending: FuturesUnordered<BoxFuture<'_, ()>> = FuturesUnordered::new();

        info!(room = %self.room, user = %self.identity.user_id, "Session loop started");
        while !self.is_disconnected() {
            let step = tokio::select! {
                Some(()) = pending.next(), if !pending.is_empty() => Step::Settled,
                msg = inbound.recv() => match msg {
                    Some(message) => Step::Signal(message),
                    None => Step::InboundClosed,
                },
                Some(signal) = conn_rx.recv() => Step::Connection(signal),
                _ = self.shutdown.notified() => Step::Shutdown,
            };

            match step {
                Step::Signal(message) => pending.push(self.handle_signal(message).boxed()),
                Step::Connection(signal) => {
                    pending.push(self.handle_connection_signal(signal).boxed())
                }
                Step::Settled => {}
                Step::InboundClosed => {
                    info!(room = %self.room, "Signaling stream ended");
                    break;
                }
                Step::Shutdown => break,
            }
        }

        // Let suspended handlers finish; each re-checks liveness and
        // discards its result.
        while pending.next().await.is_some() {}
        *self.conn_rx.lock().await = Some(conn_rx);
        info!(room = %self.room, "Session loop stopped");
    }

    /// Handle every connection callback queued so far.
    #[cfg(test)]
    pub(crate) async fn process_connection_signals(&self) {
        let mut queued = Vec::new();
        if let Some(rx) = self.conn_rx.lock().await.as_mut() {
            while let Ok(signal) = rx.try_recv() {
                queued.push(signal);
            }
        }
        for signal in queued {
            self.handle_connection_signal(signal).await;
        }
    }

    // -- accessors --

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Remote streams currently rendered for `class`.
    pub async fn remote_media(&self, class: ConnectionClass) -> Vec<(PeerId, RemoteStream)> {
        self.state.lock().await.registry.snapshot(class)
    }

    pub async fn negotiation_state(
        &self,
        peer: &PeerId,
        class: ConnectionClass,
    ) -> Option<NegotiationState> {
        self.state
            .lock()
            .await
            .registry
            .get(peer, class)
            .ok()
            .map(|r| r.state)
    }

    pub async fn is_in_flight(&self, peer: &PeerId, class: ConnectionClass) -> bool {
        self.state
            .lock()
            .await
            .in_flight
            .contains(&ConnectionKey::new(peer.clone(), class))
    }

    /// Peers with a live connection of `class`.
    pub async fn peers(&self, class: ConnectionClass) -> Vec<PeerId> {
        self.state.lock().await.registry.peers(class)
    }

    // -- internals shared by the handlers --

    async fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Report removed records and refresh the media view of each class that
    /// lost a stream.
    async fn report_removed(&self, removed: Vec<PeerConnectionRecord>, reason: RemovalReason) {
        let mut changed: Vec<ConnectionClass> = Vec::new();
        for record in &removed {
            if record.remote_stream.is_some() && !changed.contains(&record.class) {
                changed.push(record.class);
            }
        }
        for record in removed {
            debug!(peer = %record.peer, class = %record.class, ?reason, "Connection removed");
            self.emit(CallEvent::PeerRemoved {
                peer: record.peer,
                class: record.class,
                reason,
            })
            .await;
        }
        for class in changed {
            self.publish_media(class).await;
        }
    }

    async fn publish_media(&self, class: ConnectionClass) {
        let media = self.state.lock().await.registry.snapshot(class);
        self.emit(CallEvent::RemoteMediaChanged { class, media }).await;
    }
}
