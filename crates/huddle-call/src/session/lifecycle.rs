//! Join, leave and local media toggles.

use huddle_common::SignalMessage;
use tracing::{debug, info};

use crate::media::{acquire_local_media, TrackKind};

use super::{CallError, CallEvent, CallSession};

impl CallSession {
    /// Acquire local media (degrading as needed) and join the room.
    pub async fn start(&self) -> Result<(), CallError> {
        if self.is_disconnected() {
            return Err(CallError::Disconnected);
        }

        let stream = acquire_local_media(self.media.as_ref(), &self.config.media).await;
        let audio = stream.has(TrackKind::Audio);
        let video = stream.has(TrackKind::Video);
        {
            let mut state = self.state.lock().await;
            for track in stream.tracks_of(TrackKind::Audio) {
                track.set_enabled(!state.muted);
            }
            for track in stream.tracks_of(TrackKind::Video) {
                track.set_enabled(!state.video_off);
            }
            let previous = std::mem::replace(&mut state.local_media, stream);
            previous.stop_all();
        }
        self.emit(CallEvent::LocalMediaReady { audio, video }).await;

        self.signaling
            .send(SignalMessage::Join {
                room_id: self.room.clone(),
                user_id: self.identity.user_id.clone(),
            })
            .await?;
        info!(room = %self.room, user = %self.identity.user_id, audio, video, "Joined room");
        Ok(())
    }

    /// Leave the room: close every connection, stop capture and the
    /// signaling channel. Later events are ignored. Idempotent.
    pub async fn disconnect(&self) {
        let (removed, local_media, share) = {
            let mut state = self.state.lock().await;
            if self.disconnected.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            state.in_flight.clear();
            let removed = state.registry.remove_all();
            (
                removed,
                std::mem::take(&mut state.local_media),
                state.share.take(),
            )
        };
        self.shutdown.notify_one();

        if let Err(e) = self
            .signaling
            .send(SignalMessage::DisconnectCall {
                room_id: self.room.clone(),
                user_id: self.identity.user_id.clone(),
            })
            .await
        {
            debug!(error = %e, "Could not announce departure");
        }

        local_media.stop_all();
        if let Some(track) = share {
            track.stop();
        }
        self.signaling.close().await;

        info!(room = %self.room, connections = removed.len(), "Disconnected from call");
        self.emit(CallEvent::Disconnected).await;
    }

    // -- toggles --

    /// Flip microphone mute. Returns the new muted flag.
    pub async fn toggle_audio(&self) -> bool {
        let mut state = self.state.lock().await;
        let muted = !state.muted;
        state.muted = muted;
        for track in state.local_media.tracks_of(TrackKind::Audio) {
            track.set_enabled(!muted);
        }
        debug!(muted, "Audio toggled");
        muted
    }

    /// Flip camera off. Returns the new video-off flag.
    pub async fn toggle_video(&self) -> bool {
        let mut state = self.state.lock().await;
        let video_off = !state.video_off;
        state.video_off = video_off;
        for track in state.local_media.tracks_of(TrackKind::Video) {
            track.set_enabled(!video_off);
        }
        debug!(video_off, "Video toggled");
        video_off
    }

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.muted
    }

    pub async fn is_video_off(&self) -> bool {
        self.state.lock().await.video_off
    }
}
