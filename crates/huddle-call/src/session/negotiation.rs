//! Offer/answer handling for both connection classes.
//!
//! The same per-peer machine serves camera/mic and screen share; the class
//! only picks the wire event names and which local tracks get attached.
//! Glare is not resolved: if both sides offer at once, whichever offer
//! reaches a side first claims the key there and the other is dropped as a
//! duplicate.

use std::sync::Arc;

use huddle_common::{CandidatePayload, PeerId, RoomId, SdpPayload, SessionDescription, SignalMessage};
use tracing::{debug, info, warn};

use crate::connection::{
    make_answer, make_offer, ConnectionEvent, ConnectionEvents, ConnectionSignal, PeerConnection,
};
use crate::media::LocalTrack;
use crate::registry::{ConnectionClass, ConnectionKey, NegotiationState, Origin, PeerConnectionRecord};

use super::{CallEvent, CallSession, RemovalReason};

impl CallSession {
    // -----------------------------------------------------------------------
    // Inbound signaling
    // -----------------------------------------------------------------------

    /// Handle one inbound signaling event.
    pub async fn handle_signal(&self, message: SignalMessage) {
        if self.is_disconnected() {
            debug!(event = message.event_name(), "Session disconnected, ignoring signal");
            return;
        }

        match message {
            SignalMessage::UserJoined { room_id, user_id } => {
                if room_id != self.room || user_id == self.identity.user_id {
                    return;
                }
                info!(room = %room_id, peer = %user_id, "Peer joined");
                self.initiate(user_id, ConnectionClass::Primary).await;
            }
            SignalMessage::UserLeft { room_id, user_id } => {
                if room_id == self.room {
                    self.peer_left(user_id).await;
                }
            }
            SignalMessage::Offer(p) => self.accept_offer(p, ConnectionClass::Primary).await,
            SignalMessage::Answer(p) => self.accept_answer(p, ConnectionClass::Primary).await,
            SignalMessage::IceCandidate(p) => {
                self.apply_candidate(p, ConnectionClass::Primary).await
            }
            SignalMessage::ScreenOffer(p) => {
                self.accept_offer(p, ConnectionClass::ScreenShare).await
            }
            SignalMessage::ScreenAnswer(p) => {
                self.accept_answer(p, ConnectionClass::ScreenShare).await
            }
            SignalMessage::ScreenIceCandidate(p) => {
                self.apply_candidate(p, ConnectionClass::ScreenShare).await
            }
            SignalMessage::ScreenSharingError { message } => self.share_rejected(message).await,
            SignalMessage::ScreenSharingStarted { user_id, .. } => {
                if user_id != self.identity.user_id {
                    info!(peer = %user_id, "Peer started sharing");
                    self.emit(CallEvent::RemoteShareStarted { peer: user_id }).await;
                }
            }
            SignalMessage::ScreenShareStopped { user_id, .. } => {
                if user_id != self.identity.user_id {
                    info!(peer = %user_id, "Peer stopped sharing");
                    self.emit(CallEvent::RemoteShareStopped { peer: user_id }).await;
                }
            }
            other @ (SignalMessage::Join { .. } | SignalMessage::DisconnectCall { .. }) => {
                debug!(event = other.event_name(), "Ignoring relay-bound event");
            }
        }
    }

    fn addressed_to_us(&self, room: &RoomId, target: &PeerId) -> bool {
        if room != &self.room || target != &self.identity.user_id {
            debug!(room = %room, target = %target, "Ignoring misrouted signal");
            return false;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Connection setup
    // -----------------------------------------------------------------------

    /// Claim `(peer, class)` and create its connection with local tracks
    /// attached. Returns `None` when the key is already live or in flight,
    /// or when creation failed (reported as a negotiation failure).
    async fn open_connection(
        &self,
        peer: &PeerId,
        class: ConnectionClass,
        origin: Origin,
    ) -> Option<(Arc<dyn PeerConnection>, u64)> {
        let key = ConnectionKey::new(peer.clone(), class);

        let opened = {
            let mut state = self.state.lock().await;
            if self.is_disconnected() {
                return None;
            }
            if state.in_flight.contains(&key) || state.registry.is_live(peer, class) {
                debug!(peer = %peer, class = %class, ?origin, "Connection live or in flight, ignoring");
                return None;
            }

            let tracks: Vec<LocalTrack> = match (class, origin) {
                (ConnectionClass::Primary, _) => state.local_media.active_tracks().cloned().collect(),
                (ConnectionClass::ScreenShare, Origin::Local) => match &state.share {
                    Some(track) if !track.is_stopped() => vec![track.clone()],
                    _ => {
                        debug!(peer = %peer, "Share ended before its connection opened");
                        return None;
                    }
                },
                (ConnectionClass::ScreenShare, Origin::Remote) => Vec::new(),
            };

            let generation = state.next_generation();
            let events = ConnectionEvents::new(key.clone(), generation, self.conn_tx.clone());
            let created = self
                .factory
                .create(&self.config.rtc, events)
                .and_then(|handle| {
                    for track in &tracks {
                        if let Err(e) = handle.add_track(track) {
                            handle.close();
                            return Err(e);
                        }
                    }
                    Ok(handle)
                });

            match created {
                Ok(handle) => {
                    let record = PeerConnectionRecord::new(
                        peer.clone(),
                        class,
                        origin,
                        generation,
                        Arc::clone(&handle),
                    );
                    if let Err(e) = state.registry.upsert(record) {
                        handle.close();
                        debug!(error = %e, "Registry refused connection");
                        return None;
                    }
                    state.in_flight.insert(key.clone());
                    Ok((handle, generation, tracks.len()))
                }
                Err(e) => Err(e),
            }
        };

        match opened {
            Ok((handle, generation, tracks)) => {
                info!(peer = %peer, class = %class, ?origin, generation, tracks, "Peer connection created");
                self.arm_negotiation_timeout(key, generation);
                self.emit(CallEvent::PeerAdded {
                    peer: peer.clone(),
                    class,
                })
                .await;
                Some((handle, generation))
            }
            Err(e) => {
                warn!(peer = %peer, class = %class, error = %e, "Failed to create peer connection");
                self.emit(CallEvent::NegotiationFailed {
                    peer: peer.clone(),
                    class,
                    error: e.to_string(),
                })
                .await;
                None
            }
        }
    }

    fn arm_negotiation_timeout(&self, key: ConnectionKey, generation: u64) {
        let Some(timeout) = self.config.negotiation_timeout else {
            return;
        };
        let tx = self.conn_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(ConnectionSignal::NegotiationTimeout { key, generation });
        });
    }

    fn sdp_payload(&self, peer: &PeerId, sdp: SessionDescription) -> SdpPayload {
        SdpPayload {
            room_id: self.room.clone(),
            user_id: self.identity.user_id.clone(),
            target_user_id: peer.clone(),
            sdp,
        }
    }

    // -----------------------------------------------------------------------
    // Offerer side
    // -----------------------------------------------------------------------

    /// Open a connection to `peer` and send it our offer. Returns whether
    /// the offer went out.
    pub(super) async fn initiate(&self, peer: PeerId, class: ConnectionClass) -> bool {
        let Some((handle, generation)) = self.open_connection(&peer, class, Origin::Local).await
        else {
            return false;
        };
        let key = ConnectionKey::new(peer.clone(), class);

        let offer = match make_offer(handle.as_ref()).await {
            Ok(offer) => offer,
            Err(e) => {
                self.fail_negotiation(&key, generation, e.to_string()).await;
                return false;
            }
        };

        // The peer may have left, or the connection failed, while we awaited.
        let live = self
            .state
            .lock()
            .await
            .registry
            .set_state(&key, generation, NegotiationState::OfferSent);
        if !live {
            debug!(peer = %peer, class = %class, "Connection closed during offer creation, discarding offer");
            return false;
        }

        let payload = self.sdp_payload(&peer, offer);
        let message = match class {
            ConnectionClass::Primary => SignalMessage::Offer(payload),
            ConnectionClass::ScreenShare => SignalMessage::ScreenOffer(payload),
        };
        if let Err(e) = self.signaling.send(message).await {
            self.fail_negotiation(&key, generation, e.to_string()).await;
            return false;
        }
        debug!(peer = %peer, class = %class, "Offer sent");
        true
    }

    async fn accept_answer(&self, payload: SdpPayload, class: ConnectionClass) {
        if !self.addressed_to_us(&payload.room_id, &payload.target_user_id) {
            return;
        }
        let key = ConnectionKey::new(payload.user_id.clone(), class);

        let awaiting = {
            let state = self.state.lock().await;
            match state.registry.get(&key.peer, class) {
                Ok(record) if record.state == NegotiationState::OfferSent => {
                    Some((Arc::clone(record.handle()), record.generation))
                }
                Ok(record) => {
                    debug!(peer = %key.peer, class = %class, state = ?record.state, "Unexpected answer, ignoring");
                    None
                }
                Err(e) => {
                    debug!(error = %e, "Answer for unknown connection, ignoring");
                    None
                }
            }
        };
        let Some((handle, generation)) = awaiting else {
            return;
        };

        if let Err(e) = handle.set_remote_description(payload.sdp).await {
            self.fail_negotiation(&key, generation, e.to_string()).await;
            return;
        }

        let connected = {
            let mut state = self.state.lock().await;
            let live = state
                .registry
                .set_state(&key, generation, NegotiationState::Connected);
            if live {
                state.in_flight.remove(&key);
            }
            live
        };
        if connected {
            info!(peer = %key.peer, class = %class, "Negotiation complete");
        } else {
            debug!(peer = %key.peer, class = %class, "Connection closed while applying answer");
        }
    }

    // -----------------------------------------------------------------------
    // Answerer side
    // -----------------------------------------------------------------------

    async fn accept_offer(&self, payload: SdpPayload, class: ConnectionClass) {
        if !self.addressed_to_us(&payload.room_id, &payload.target_user_id) {
            return;
        }
        let peer = payload.user_id.clone();
        let Some((handle, generation)) = self.open_connection(&peer, class, Origin::Remote).await
        else {
            return;
        };
        let key = ConnectionKey::new(peer.clone(), class);

        let answer = match make_answer(handle.as_ref(), payload.sdp).await {
            Ok(answer) => answer,
            Err(e) => {
                self.fail_negotiation(&key, generation, e.to_string()).await;
                return;
            }
        };

        let live = {
            let mut state = self.state.lock().await;
            let live = state
                .registry
                .set_state(&key, generation, NegotiationState::Connected);
            if live {
                state.in_flight.remove(&key);
            }
            live
        };
        if !live {
            debug!(peer = %peer, class = %class, "Connection closed during answer creation, discarding answer");
            return;
        }

        let reply = self.sdp_payload(&peer, answer);
        let message = match class {
            ConnectionClass::Primary => SignalMessage::Answer(reply),
            ConnectionClass::ScreenShare => SignalMessage::ScreenAnswer(reply),
        };
        if let Err(e) = self.signaling.send(message).await {
            self.fail_negotiation(&key, generation, e.to_string()).await;
            return;
        }
        info!(peer = %peer, class = %class, "Answered offer");
    }

    // -----------------------------------------------------------------------
    // Candidates and departures
    // -----------------------------------------------------------------------

    /// Apply a remote candidate. Candidates for unknown connections are
    /// dropped; a rejected candidate is logged and the connection kept,
    /// since candidates routinely race the remote description.
    async fn apply_candidate(&self, payload: CandidatePayload, class: ConnectionClass) {
        if !self.addressed_to_us(&payload.room_id, &payload.target_user_id) {
            return;
        }
        let handle = self
            .state
            .lock()
            .await
            .registry
            .get(&payload.user_id, class)
            .ok()
            .filter(|r| r.is_live())
            .map(|r| Arc::clone(r.handle()));
        let Some(handle) = handle else {
            debug!(peer = %payload.user_id, class = %class, "Dropping ICE candidate for unknown connection");
            return;
        };

        if let Err(e) = handle.add_ice_candidate(payload.candidate).await {
            warn!(peer = %payload.user_id, class = %class, error = %e, "ICE candidate rejected");
        }
    }

    async fn peer_left(&self, peer: PeerId) {
        let removed = {
            let mut state = self.state.lock().await;
            let mut removed = Vec::new();
            for class in ConnectionClass::ALL {
                state.in_flight.remove(&ConnectionKey::new(peer.clone(), class));
                if let Some(record) = state.registry.remove(&peer, class) {
                    removed.push(record);
                }
            }
            removed
        };
        info!(peer = %peer, connections = removed.len(), "Peer left");
        self.report_removed(removed, RemovalReason::Left).await;
    }

    /// Abandon a connection whose negotiation step failed. No retry.
    pub(super) async fn fail_negotiation(&self, key: &ConnectionKey, generation: u64, error: String) {
        let removed = self.state.lock().await.retire(key, generation);
        let Some(record) = removed else {
            debug!(peer = %key.peer, class = %key.class, error = %error, "Negotiation step failed on a closed connection");
            return;
        };
        warn!(peer = %key.peer, class = %key.class, generation, error = %error, "Negotiation failed");
        self.report_removed(vec![record], RemovalReason::NegotiationFailed)
            .await;
        self.emit(CallEvent::NegotiationFailed {
            peer: key.peer.clone(),
            class: key.class,
            error,
        })
        .await;
    }

    // -----------------------------------------------------------------------
    // Connection callbacks
    // -----------------------------------------------------------------------

    /// Handle a callback or timer from one of our connections.
    pub async fn handle_connection_signal(&self, signal: ConnectionSignal) {
        if self.is_disconnected() {
            return;
        }
        match signal {
            ConnectionSignal::Event {
                key,
                generation,
                event,
            } => self.on_connection_event(key, generation, event).await,
            ConnectionSignal::NegotiationTimeout { key, generation } => {
                self.on_negotiation_timeout(key, generation).await
            }
        }
    }

    async fn on_connection_event(&self, key: ConnectionKey, generation: u64, event: ConnectionEvent) {
        match event {
            ConnectionEvent::IceCandidate(candidate) => {
                let live = self
                    .state
                    .lock()
                    .await
                    .registry
                    .get_current(&key, generation)
                    .is_some();
                if !live {
                    debug!(peer = %key.peer, class = %key.class, "Dropping local candidate for closed connection");
                    return;
                }
                let payload = CandidatePayload {
                    room_id: self.room.clone(),
                    user_id: self.identity.user_id.clone(),
                    target_user_id: key.peer.clone(),
                    candidate,
                };
                let message = match key.class {
                    ConnectionClass::Primary => SignalMessage::IceCandidate(payload),
                    ConnectionClass::ScreenShare => SignalMessage::ScreenIceCandidate(payload),
                };
                if let Err(e) = self.signaling.send(message).await {
                    warn!(peer = %key.peer, error = %e, "Failed to send ICE candidate");
                }
            }
            ConnectionEvent::Track(stream) => {
                let media = {
                    let mut state = self.state.lock().await;
                    match state.registry.get_current_mut(&key, generation) {
                        Some(record) => record.remote_stream = Some(stream),
                        None => {
                            debug!(peer = %key.peer, class = %key.class, "Track for closed connection, ignoring");
                            return;
                        }
                    }
                    state.registry.snapshot(key.class)
                };
                info!(peer = %key.peer, class = %key.class, "Remote media received");
                self.emit(CallEvent::RemoteMediaChanged {
                    class: key.class,
                    media,
                })
                .await;
            }
            ConnectionEvent::StateChanged(conn_state) if conn_state.is_terminal() => {
                let removed = self.state.lock().await.retire(&key, generation);
                if let Some(record) = removed {
                    info!(peer = %key.peer, class = %key.class, state = ?conn_state, "Connection lost");
                    self.report_removed(vec![record], RemovalReason::ConnectionLost)
                        .await;
                }
            }
            ConnectionEvent::StateChanged(conn_state) => {
                debug!(peer = %key.peer, class = %key.class, state = ?conn_state, "Connection state changed");
            }
        }
    }

    async fn on_negotiation_timeout(&self, key: ConnectionKey, generation: u64) {
        let removed = {
            let mut state = self.state.lock().await;
            let stalled = state
                .registry
                .get_current(&key, generation)
                .map(|r| r.state.is_in_flight())
                .unwrap_or(false);
            if !stalled {
                return;
            }
            state.retire(&key, generation)
        };
        let Some(record) = removed else {
            return;
        };

        let secs = self
            .config
            .negotiation_timeout
            .map(|t| t.as_secs())
            .unwrap_or_default();
        warn!(peer = %key.peer, class = %key.class, generation, timeout_secs = secs, "Negotiation timed out");
        self.report_removed(vec![record], RemovalReason::TimedOut).await;
        self.emit(CallEvent::NegotiationFailed {
            peer: key.peer,
            class: key.class,
            error: format!("negotiation timed out after {secs}s"),
        })
        .await;
    }
}
