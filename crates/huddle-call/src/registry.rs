//! Per-session bookkeeping of peer connections.
//!
//! [`ConnectionRegistry`] holds at most one live record per
//! (peer, class). [`InFlightSet`] marks keys whose offer/answer exchange
//! has started and not finished; both are consulted before any suspending
//! step so that a second attempt for the same key is dropped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use huddle_common::PeerId;
use tracing::debug;

use crate::connection::PeerConnection;
use crate::media::RemoteStream;

// ---------------------------------------------------------------------------
// Keys and states
// ---------------------------------------------------------------------------

/// Which kind of media a connection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionClass {
    /// Camera and microphone.
    Primary,
    /// One display-capture video track.
    ScreenShare,
}

impl ConnectionClass {
    pub const ALL: [ConnectionClass; 2] = [Self::Primary, Self::ScreenShare];
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::ScreenShare => f.write_str("screen_share"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub peer: PeerId,
    pub class: ConnectionClass,
}

impl ConnectionKey {
    pub fn new(peer: PeerId, class: ConnectionClass) -> Self {
        Self { peer, class }
    }
}

/// Where an offer/answer exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Created, local offer not yet sent.
    Idle,
    /// Our offer is out; waiting for the answer.
    OfferSent,
    /// Remote offer received; our answer is being produced.
    AnswerPending,
    Connected,
    /// Close requested.
    Closing,
    Closed,
}

impl NegotiationState {
    /// The exchange has started and not finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Idle | Self::OfferSent | Self::AnswerPending)
    }
}

/// Which side sent the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

pub struct PeerConnectionRecord {
    pub peer: PeerId,
    pub class: ConnectionClass,
    pub origin: Origin,
    /// Distinguishes this connection from earlier ones under the same key.
    pub generation: u64,
    pub state: NegotiationState,
    pub remote_stream: Option<RemoteStream>,
    handle: Arc<dyn PeerConnection>,
}

impl PeerConnectionRecord {
    pub fn new(
        peer: PeerId,
        class: ConnectionClass,
        origin: Origin,
        generation: u64,
        handle: Arc<dyn PeerConnection>,
    ) -> Self {
        let state = match origin {
            Origin::Local => NegotiationState::Idle,
            Origin::Remote => NegotiationState::AnswerPending,
        };
        Self {
            peer,
            class,
            origin,
            generation,
            state,
            remote_stream: None,
            handle,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.peer.clone(), self.class)
    }

    pub fn handle(&self) -> &Arc<dyn PeerConnection> {
        &self.handle
    }

    pub fn is_live(&self) -> bool {
        self.state != NegotiationState::Closed
    }

    fn close(&mut self) {
        self.state = NegotiationState::Closing;
        self.handle.close();
        self.state = NegotiationState::Closed;
    }
}

impl fmt::Debug for PeerConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnectionRecord")
            .field("peer", &self.peer)
            .field("class", &self.class)
            .field("origin", &self.origin)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("remote_stream", &self.remote_stream)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a live {class} connection to {peer} already exists")]
    DuplicateConnection { peer: PeerId, class: ConnectionClass },
    #[error("no {class} connection to {peer}")]
    NotFound { peer: PeerId, class: ConnectionClass },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Live connections of one room session, keyed by (peer, class).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: HashMap<ConnectionKey, PeerConnectionRecord>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Fails if a live record already holds the key; a
    /// closed leftover is replaced.
    pub fn upsert(&mut self, record: PeerConnectionRecord) -> Result<(), RegistryError> {
        let key = record.key();
        if let Some(existing) = self.records.get(&key) {
            if existing.is_live() {
                return Err(RegistryError::DuplicateConnection {
                    peer: key.peer,
                    class: key.class,
                });
            }
        }
        self.records.insert(key, record);
        Ok(())
    }

    pub fn get(
        &self,
        peer: &PeerId,
        class: ConnectionClass,
    ) -> Result<&PeerConnectionRecord, RegistryError> {
        self.records
            .get(&ConnectionKey::new(peer.clone(), class))
            .ok_or_else(|| RegistryError::NotFound {
                peer: peer.clone(),
                class,
            })
    }

    /// The record under `key`, only if it belongs to `generation`.
    pub fn get_current(&self, key: &ConnectionKey, generation: u64) -> Option<&PeerConnectionRecord> {
        self.records
            .get(key)
            .filter(|r| r.generation == generation && r.is_live())
    }

    pub fn get_current_mut(
        &mut self,
        key: &ConnectionKey,
        generation: u64,
    ) -> Option<&mut PeerConnectionRecord> {
        self.records
            .get_mut(key)
            .filter(|r| r.generation == generation && r.is_live())
    }

    pub fn is_live(&self, peer: &PeerId, class: ConnectionClass) -> bool {
        self.get(peer, class).map(|r| r.is_live()).unwrap_or(false)
    }

    pub fn generation_of(&self, key: &ConnectionKey) -> Option<u64> {
        self.records.get(key).map(|r| r.generation)
    }

    /// Move the record to `state` if it is still the same connection.
    /// Returns `false` when the record is gone or was replaced.
    pub fn set_state(
        &mut self,
        key: &ConnectionKey,
        generation: u64,
        state: NegotiationState,
    ) -> bool {
        match self.get_current_mut(key, generation) {
            Some(record) => {
                record.state = state;
                true
            }
            None => false,
        }
    }

    /// Close and drop the record. Always succeeds; a missing key is a no-op.
    pub fn remove(&mut self, peer: &PeerId, class: ConnectionClass) -> Option<PeerConnectionRecord> {
        let mut record = self.records.remove(&ConnectionKey::new(peer.clone(), class))?;
        record.close();
        debug!(peer = %peer, class = %class, generation = record.generation, "Connection removed");
        Some(record)
    }

    /// Remove the record only if it still belongs to `generation`.
    pub fn remove_current(
        &mut self,
        key: &ConnectionKey,
        generation: u64,
    ) -> Option<PeerConnectionRecord> {
        if self.generation_of(key) != Some(generation) {
            return None;
        }
        self.remove(&key.peer, key.class)
    }

    /// Close and drop everything.
    pub fn remove_all(&mut self) -> Vec<PeerConnectionRecord> {
        let mut removed: Vec<PeerConnectionRecord> =
            self.records.drain().map(|(_, record)| record).collect();
        for record in &mut removed {
            record.close();
        }
        removed
    }

    /// Keys of live records matching `pred`.
    pub fn keys_where(&self, pred: impl Fn(&PeerConnectionRecord) -> bool) -> Vec<ConnectionKey> {
        self.records
            .values()
            .filter(|r| r.is_live() && pred(r))
            .map(PeerConnectionRecord::key)
            .collect()
    }

    /// Peers holding a live record of `class`, in stable order.
    pub fn peers(&self, class: ConnectionClass) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .records
            .values()
            .filter(|r| r.class == class && r.is_live())
            .map(|r| r.peer.clone())
            .collect();
        peers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        peers
    }

    /// Remote streams received on `class`, in stable peer order.
    pub fn snapshot(&self, class: ConnectionClass) -> Vec<(PeerId, RemoteStream)> {
        let mut media: Vec<(PeerId, RemoteStream)> = self
            .records
            .values()
            .filter(|r| r.class == class && r.is_live())
            .filter_map(|r| r.remote_stream.clone().map(|s| (r.peer.clone(), s)))
            .collect();
        media.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        media
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// In-flight set
// ---------------------------------------------------------------------------

/// Keys with an unfinished offer/answer exchange.
#[derive(Debug, Default)]
pub struct InFlightSet {
    keys: HashSet<ConnectionKey>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already in flight.
    pub fn insert(&mut self, key: ConnectionKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &ConnectionKey) -> bool {
        self.keys.remove(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
