//! The peer-connection primitive and its callback plumbing.
//!
//! The coordinator never talks to a WebRTC stack directly. It asks a
//! [`ConnectionFactory`] for a [`PeerConnection`] and hands it a
//! [`ConnectionEvents`] sink; everything the connection reports later
//! (local candidates, remote tracks, state changes) comes back through that
//! sink tagged with the connection's key and generation.

use std::sync::Arc;

use async_trait::async_trait;
use huddle_common::{IceCandidate, SessionDescription};
use huddle_config::schema::{IceConfig, IceServer};
use tokio::sync::mpsc;

use crate::media::{LocalTrack, RemoteStream};
use crate::registry::ConnectionKey;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What every new connection is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_candidate_pool_size: u8,
}

impl From<&IceConfig> for RtcConfiguration {
    fn from(ice: &IceConfig) -> Self {
        Self {
            ice_servers: ice.servers.clone(),
            ice_candidate_pool_size: ice.candidate_pool_size,
        }
    }
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self::from(&IceConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Transport-level state reported by the primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States after which the connection is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A local candidate was gathered and should be trickled to the peer.
    IceCandidate(IceCandidate),
    /// The peer's media arrived.
    Track(RemoteStream),
    StateChanged(ConnectionState),
}

/// Work delivered to the session loop from outside signaling.
#[derive(Debug, Clone)]
pub enum ConnectionSignal {
    Event {
        key: ConnectionKey,
        generation: u64,
        event: ConnectionEvent,
    },
    /// The negotiation timer for this connection expired.
    NegotiationTimeout { key: ConnectionKey, generation: u64 },
}

/// Callback sink bound to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    key: ConnectionKey,
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectionSignal>,
}

impl ConnectionEvents {
    pub(crate) fn new(
        key: ConnectionKey,
        generation: u64,
        tx: mpsc::UnboundedSender<ConnectionSignal>,
    ) -> Self {
        Self {
            key,
            generation,
            tx,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Safe to call from any thread; returns `false` once
    /// the session is gone.
    pub fn emit(&self, event: ConnectionEvent) -> bool {
        self.tx
            .send(ConnectionSignal::Event {
                key: self.key.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Primitive
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to create peer connection: {0}")]
    Create(String),
    #[error("failed to attach track: {0}")]
    AddTrack(String),
    #[error("session description rejected: {0}")]
    Description(String),
    #[error("ICE candidate rejected: {0}")]
    Candidate(String),
    #[error("connection is closed")]
    Closed,
}

/// One peer connection as exposed by the underlying WebRTC stack.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: &LocalTrack) -> Result<(), ConnectionError>;

    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn set_local_description(&self, desc: SessionDescription)
        -> Result<(), ConnectionError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), ConnectionError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ConnectionError>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}

/// Creates connections for the coordinator.
pub trait ConnectionFactory: Send + Sync {
    fn create(
        &self,
        config: &RtcConfiguration,
        events: ConnectionEvents,
    ) -> Result<Arc<dyn PeerConnection>, ConnectionError>;
}

// ---------------------------------------------------------------------------
// Negotiation steps
// ---------------------------------------------------------------------------

/// Offerer side: create an offer and install it locally.
pub(crate) async fn make_offer(
    handle: &dyn PeerConnection,
) -> Result<SessionDescription, ConnectionError> {
    let offer = handle.create_offer().await?;
    handle.set_local_description(offer.clone()).await?;
    Ok(offer)
}

/// Answerer side: install the remote offer, then create and install the
/// answer.
pub(crate) async fn make_answer(
    handle: &dyn PeerConnection,
    offer: SessionDescription,
) -> Result<SessionDescription, ConnectionError> {
    handle.set_remote_description(offer).await?;
    let answer = handle.create_answer().await?;
    handle.set_local_description(answer.clone()).await?;
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionClass;
    use huddle_common::PeerId;

    #[test]
    fn rtc_configuration_from_ice_defaults() {
        let rtc = RtcConfiguration::default();
        assert_eq!(rtc.ice_candidate_pool_size, 10);
        assert_eq!(rtc.ice_servers[0].urls[0], "stun:stun.l.google.com:19302");
    }

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }

    #[test]
    fn events_are_tagged_with_key_and_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = ConnectionKey::new(PeerId::from("bob"), ConnectionClass::Primary);
        let events = ConnectionEvents::new(key.clone(), 7, tx);

        assert!(events.emit(ConnectionEvent::StateChanged(ConnectionState::Connected)));
        match rx.try_recv().unwrap() {
            ConnectionSignal::Event {
                key: got,
                generation,
                event: ConnectionEvent::StateChanged(ConnectionState::Connected),
            } => {
                assert_eq!(got, key);
                assert_eq!(generation, 7);
            }
            other => panic!("unexpected signal: {other:?}"),
        }

        drop(rx);
        assert!(!events.emit(ConnectionEvent::StateChanged(ConnectionState::Closed)));
    }
}
