//! Session configuration, UI events and errors.

use std::time::Duration;

use huddle_common::PeerId;
use huddle_config::schema::{MediaConfig, ScreenShareConfig};
use huddle_config::HuddleConfig;

use crate::connection::RtcConfiguration;
use crate::media::{MediaError, RemoteStream};
use crate::registry::ConnectionClass;
use crate::signaling::SignalingError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// The slice of [`HuddleConfig`] a call session runs with.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub rtc: RtcConfiguration,
    /// How long a connection may stay in flight. `None` disables the timer.
    pub negotiation_timeout: Option<Duration>,
    pub media: MediaConfig,
    pub screen_share: ScreenShareConfig,
}

impl From<&HuddleConfig> for CallConfig {
    fn from(config: &HuddleConfig) -> Self {
        let timeout_secs = config.negotiation.timeout_secs;
        Self {
            rtc: RtcConfiguration::from(&config.ice),
            negotiation_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            media: config.media.clone(),
            screen_share: config.screen_share.clone(),
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self::from(&HuddleConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The relay reported the peer left.
    Left,
    /// The connection reported failed or closed.
    ConnectionLost,
    NegotiationFailed,
    /// Still in flight when the negotiation timer fired.
    TimedOut,
}

/// Events for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// Local capture settled. Either flag may be false after fallback.
    LocalMediaReady { audio: bool, video: bool },
    PeerAdded {
        peer: PeerId,
        class: ConnectionClass,
    },
    /// Full set of remote streams for `class` after a change.
    RemoteMediaChanged {
        class: ConnectionClass,
        media: Vec<(PeerId, RemoteStream)>,
    },
    PeerRemoved {
        peer: PeerId,
        class: ConnectionClass,
        reason: RemovalReason,
    },
    NegotiationFailed {
        peer: PeerId,
        class: ConnectionClass,
        error: String,
    },
    /// Local share is live; `offers` screen offers went out.
    ScreenShareStarted { offers: usize },
    /// Local share ended; `closed` share connections were torn down.
    ScreenShareStopped { closed: usize },
    /// The relay refused our share.
    ScreenShareRejected { message: String },
    RemoteShareStarted { peer: PeerId },
    RemoteShareStopped { peer: PeerId },
    Disconnected,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the public session operations.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("session is disconnected")]
    Disconnected,
    #[error("screen sharing is disabled")]
    ScreenShareDisabled,
    #[error("screen share already active")]
    AlreadySharing,
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

impl CallError {
    /// The user dismissed the display picker.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::Media(MediaError::UserCancelled))
    }
}
