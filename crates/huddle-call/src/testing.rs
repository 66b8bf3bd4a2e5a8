//! Scriptable fakes for the media, connection and signaling capabilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use huddle_common::{IceCandidate, PeerId, SessionDescription, SignalMessage};
use tokio::sync::{mpsc, Notify};

use crate::connection::{
    ConnectionError, ConnectionEvent, ConnectionEvents, ConnectionFactory, PeerConnection,
    RtcConfiguration,
};
use crate::media::{
    DisplayConstraints, LocalStream, LocalTrack, MediaConstraints, MediaError,
    MediaSourceProvider, TrackKind,
};
use crate::registry::{ConnectionClass, ConnectionKey};
use crate::signaling::{SignalingChannel, SignalingError};

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// How fake connections behave.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub fail_create: bool,
    pub fail_offer: bool,
    pub fail_answer: bool,
    pub fail_remote: bool,
    pub fail_candidate: bool,
    /// `create_offer` waits for a permit before returning.
    pub offer_gate: Option<Arc<Notify>>,
    /// `create_answer` waits for a permit before returning.
    pub answer_gate: Option<Arc<Notify>>,
}

pub(crate) struct FakeConnection {
    pub events: ConnectionEvents,
    script: Script,
    tracks: Mutex<Vec<LocalTrack>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    closes: AtomicUsize,
}

impl FakeConnection {
    pub fn new(events: ConnectionEvents, script: Script) -> Self {
        Self {
            events,
            script,
            tracks: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        }
    }

    /// A connection whose callbacks go nowhere.
    pub fn detached(peer: &str, class: ConnectionClass) -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let key = ConnectionKey::new(PeerId::from(peer), class);
        Arc::new(Self::new(ConnectionEvents::new(key, 0, tx), Script::default()))
    }

    pub fn key(&self) -> &ConnectionKey {
        self.events.key()
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }

    /// Simulate a callback from the underlying stack.
    pub fn emit(&self, event: ConnectionEvent) {
        self.events.emit(event);
    }

    fn check_open(&self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    fn add_track(&self, track: &LocalTrack) -> Result<(), ConnectionError> {
        self.check_open()?;
        self.tracks.lock().unwrap().push(track.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError> {
        if let Some(gate) = &self.script.offer_gate {
            gate.notified().await;
        }
        if self.script.fail_offer {
            return Err(ConnectionError::Description("createOffer failed".into()));
        }
        Ok(SessionDescription::offer(format!(
            "offer:{}:{}",
            self.key().peer,
            self.events.generation()
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError> {
        if let Some(gate) = &self.script.answer_gate {
            gate.notified().await;
        }
        if self.script.fail_answer {
            return Err(ConnectionError::Description("createAnswer failed".into()));
        }
        Ok(SessionDescription::answer(format!(
            "answer:{}:{}",
            self.key().peer,
            self.events.generation()
        )))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), ConnectionError> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), ConnectionError> {
        if self.script.fail_remote {
            return Err(ConnectionError::Description("malformed SDP".into()));
        }
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), ConnectionError> {
        if self.script.fail_candidate {
            return Err(ConnectionError::Candidate("no remote description".into()));
        }
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    script: Mutex<Script>,
    created: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeFactory {
    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn created(&self) -> Vec<Arc<FakeConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_for(&self, peer: &str, class: ConnectionClass) -> Vec<Arc<FakeConnection>> {
        self.created()
            .into_iter()
            .filter(|c| c.key().peer.as_str() == peer && c.key().class == class)
            .collect()
    }

    /// Most recent connection for the key.
    pub fn latest(&self, peer: &str, class: ConnectionClass) -> Arc<FakeConnection> {
        self.created_for(peer, class)
            .pop()
            .unwrap_or_else(|| panic!("no {class} connection created for {peer}"))
    }
}

impl ConnectionFactory for FakeFactory {
    fn create(
        &self,
        _config: &RtcConfiguration,
        events: ConnectionEvents,
    ) -> Result<Arc<dyn PeerConnection>, ConnectionError> {
        let script = self.script.lock().unwrap().clone();
        if script.fail_create {
            return Err(ConnectionError::Create("out of ports".into()));
        }
        let conn = Arc::new(FakeConnection::new(events, script));
        self.created.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub(crate) struct FakeMedia {
    camera: bool,
    mic: bool,
    cancel_display: AtomicBool,
    displays: Mutex<Vec<LocalTrack>>,
}

impl FakeMedia {
    pub fn new(camera: bool, mic: bool) -> Self {
        Self {
            camera,
            mic,
            cancel_display: AtomicBool::new(false),
            displays: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel_display(&self, cancel: bool) {
        self.cancel_display.store(cancel, Ordering::SeqCst);
    }

    pub fn displays(&self) -> Vec<LocalTrack> {
        self.displays.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSourceProvider for FakeMedia {
    async fn acquire(&self, c: MediaConstraints) -> Result<LocalStream, MediaError> {
        if (c.video && !self.camera) || (c.audio && !self.mic) {
            return Err(MediaError::AcquireFailure("device unavailable".into()));
        }
        let mut tracks = Vec::new();
        if c.audio {
            tracks.push(LocalTrack::new(TrackKind::Audio, "mic"));
        }
        if c.video {
            tracks.push(LocalTrack::new(TrackKind::Video, "camera"));
        }
        Ok(LocalStream::new(tracks))
    }

    async fn acquire_display(&self, _c: DisplayConstraints) -> Result<LocalTrack, MediaError> {
        if self.cancel_display.load(Ordering::SeqCst) {
            return Err(MediaError::UserCancelled);
        }
        let track = LocalTrack::new(TrackKind::Video, "display");
        self.displays.lock().unwrap().push(track.clone());
        Ok(track)
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingSignaling {
    sent: Mutex<Vec<SignalMessage>>,
    closed: AtomicBool,
}

impl RecordingSignaling {
    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_named(&self, name: &str) -> Vec<SignalMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.event_name() == name)
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.sent_named(name).len()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        if self.is_closed() {
            return Err(SignalingError::Closed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
