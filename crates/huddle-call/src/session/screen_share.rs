//! Local screen sharing: one share connection per primary peer.

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::media::{DisplayConstraints, MediaError};
use crate::registry::{ConnectionClass, Origin};

use super::{CallError, CallEvent, CallSession};

impl CallSession {
    /// Capture a display surface and offer it to every peer we currently
    /// hold a primary connection with. Returns how many offers went out.
    ///
    /// Peers that join later are not offered the running share.
    pub async fn start_screen_share(&self) -> Result<usize, CallError> {
        if !self.config.screen_share.enabled {
            return Err(CallError::ScreenShareDisabled);
        }
        if self.is_disconnected() {
            return Err(CallError::Disconnected);
        }
        if self.is_sharing().await {
            return Err(CallError::AlreadySharing);
        }

        let constraints = DisplayConstraints::from(self.config.screen_share.quality);
        let track = match self.media.acquire_display(constraints).await {
            Ok(track) => track,
            Err(MediaError::UserCancelled) => {
                info!("Screen share cancelled by user");
                return Err(MediaError::UserCancelled.into());
            }
            Err(e) => {
                warn!(error = %e, "Display capture failed");
                return Err(e.into());
            }
        };

        let peers = {
            let mut state = self.state.lock().await;
            if self.is_disconnected() {
                track.stop();
                return Err(CallError::Disconnected);
            }
            if state.share.is_some() {
                track.stop();
                return Err(CallError::AlreadySharing);
            }
            state.share = Some(track);
            state.registry.peers(ConnectionClass::Primary)
        };
        info!(peers = peers.len(), "Screen share started");

        let offers = join_all(
            peers
                .into_iter()
                .map(|peer| self.initiate(peer, ConnectionClass::ScreenShare)),
        )
        .await
        .into_iter()
        .filter(|sent| *sent)
        .count();

        self.emit(CallEvent::ScreenShareStarted { offers }).await;
        Ok(offers)
    }

    /// Stop the display track and close the share connections we opened.
    /// Shares received from peers are left alone. Nothing is signaled;
    /// peers see their side of the connection close.
    pub async fn stop_screen_share(&self) -> usize {
        let (track, removed) = {
            let mut state = self.state.lock().await;
            let Some(track) = state.share.take() else {
                return 0;
            };
            let keys = state.registry.keys_where(|r| {
                r.class == ConnectionClass::ScreenShare && r.origin == Origin::Local
            });
            let mut removed = Vec::with_capacity(keys.len());
            for key in keys {
                state.in_flight.remove(&key);
                if let Some(record) = state.registry.remove(&key.peer, key.class) {
                    removed.push(record);
                }
            }
            (track, removed)
        };

        track.stop();
        let closed = removed.len();
        info!(closed, "Screen share stopped");
        self.emit(CallEvent::ScreenShareStopped { closed }).await;
        closed
    }

    pub async fn is_sharing(&self) -> bool {
        self.state.lock().await.share.is_some()
    }

    /// The relay refused our share.
    pub(super) async fn share_rejected(&self, message: String) {
        warn!(message = %message, "Relay rejected screen share");
        self.stop_screen_share().await;
        self.emit(CallEvent::ScreenShareRejected { message }).await;
    }
}
