//! Local capture tracks and the media-source capability.
//!
//! A [`LocalTrack`] is shared by every connection it is attached to. Its
//! `enabled` flag is the broadcast point for mute and video-off: flipping it
//! once silences the track on all peers without renegotiation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use huddle_common::new_id;
use huddle_config::schema::{MediaConfig, ShareQuality};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A captured local track. Clones share one underlying track.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: new_id(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop capture. A stopped track is never attached to new connections.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same underlying track.
    pub fn same_track(&self, other: &LocalTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The local capture stream. May hold zero tracks when every acquisition
/// attempt failed.
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// Tracks still capturing.
    pub fn active_tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| !t.is_stopped())
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks_of(kind).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// A stream received from a remote peer, as handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub stream_id: String,
    pub kinds: Vec<TrackKind>,
}

impl RemoteStream {
    pub fn new(stream_id: impl Into<String>, kinds: Vec<TrackKind>) -> Self {
        Self {
            stream_id: stream_id.into(),
            kinds,
        }
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    /// Attempts in order, starting from the configured preference and
    /// degrading to audio only. Empty when nothing is wanted.
    pub fn fallback_ladder(prefs: &MediaConfig) -> Vec<MediaConstraints> {
        let mut ladder = Vec::with_capacity(2);
        if prefs.video {
            ladder.push(MediaConstraints {
                video: true,
                audio: prefs.audio,
            });
        }
        if prefs.audio {
            ladder.push(MediaConstraints {
                video: false,
                audio: true,
            });
        }
        ladder
    }
}

/// Capture limits for a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConstraints {
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: u32,
}

impl From<ShareQuality> for DisplayConstraints {
    fn from(quality: ShareQuality) -> Self {
        Self {
            max_width: quality.max_width(),
            max_height: quality.max_height(),
            max_fps: quality.max_fps(),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media acquisition failed: {0}")]
    AcquireFailure(String),
    #[error("display capture cancelled by user")]
    UserCancelled,
}

/// Source of local capture: camera, microphone and display surfaces.
#[async_trait]
pub trait MediaSourceProvider: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError>;

    /// Capture a display surface as a single video track.
    async fn acquire_display(
        &self,
        constraints: DisplayConstraints,
    ) -> Result<LocalTrack, MediaError>;
}

/// Walk the fallback ladder. Never fails: the last resort is a stream with
/// zero tracks, and the session carries on without local media.
pub async fn acquire_local_media(
    provider: &dyn MediaSourceProvider,
    prefs: &MediaConfig,
) -> LocalStream {
    for constraints in MediaConstraints::fallback_ladder(prefs) {
        match provider.acquire(constraints).await {
            Ok(stream) => {
                info!(
                    video = constraints.video,
                    audio = constraints.audio,
                    tracks = stream.tracks().len(),
                    "Local media acquired"
                );
                return stream;
            }
            Err(e) => {
                warn!(
                    video = constraints.video,
                    audio = constraints.audio,
                    error = %e,
                    "Media acquisition failed, degrading"
                );
            }
        }
    }
    warn!("No local media available, joining with zero tracks");
    LocalStream::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        allow_video: bool,
        allow_audio: bool,
        attempts: Mutex<Vec<MediaConstraints>>,
    }

    #[async_trait]
    impl MediaSourceProvider for Scripted {
        async fn acquire(&self, c: MediaConstraints) -> Result<LocalStream, MediaError> {
            self.attempts.lock().unwrap().push(c);
            if (c.video && !self.allow_video) || (c.audio && !self.allow_audio) {
                return Err(MediaError::AcquireFailure("NotAllowedError".into()));
            }
            let mut tracks = Vec::new();
            if c.audio {
                tracks.push(LocalTrack::new(TrackKind::Audio, "mic"));
            }
            if c.video {
                tracks.push(LocalTrack::new(TrackKind::Video, "cam"));
            }
            Ok(LocalStream::new(tracks))
        }

        async fn acquire_display(&self, _: DisplayConstraints) -> Result<LocalTrack, MediaError> {
            Err(MediaError::UserCancelled)
        }
    }

    fn scripted(allow_video: bool, allow_audio: bool) -> Scripted {
        Scripted {
            allow_video,
            allow_audio,
            attempts: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn clones_share_enabled_flag() {
        let track = LocalTrack::new(TrackKind::Audio, "mic");
        let attached = track.clone();
        track.set_enabled(false);
        assert!(!attached.is_enabled());
        assert!(track.same_track(&attached));
        assert!(!track.same_track(&LocalTrack::new(TrackKind::Audio, "mic")));
    }

    #[test]
    fn ladder_follows_preferences() {
        let both = MediaConfig::default();
        assert_eq!(
            MediaConstraints::fallback_ladder(&both),
            vec![
                MediaConstraints { video: true, audio: true },
                MediaConstraints { video: false, audio: true },
            ]
        );

        let audio_only = MediaConfig { video: false, audio: true };
        assert_eq!(MediaConstraints::fallback_ladder(&audio_only).len(), 1);

        let nothing = MediaConfig { video: false, audio: false };
        assert!(MediaConstraints::fallback_ladder(&nothing).is_empty());
    }

    #[tokio::test]
    async fn camera_denied_falls_back_to_audio() {
        let provider = scripted(false, true);
        let stream = acquire_local_media(&provider, &MediaConfig::default()).await;
        assert!(stream.has(TrackKind::Audio));
        assert!(!stream.has(TrackKind::Video));
        assert_eq!(provider.attempts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn everything_denied_yields_empty_stream() {
        let provider = scripted(false, false);
        let stream = acquire_local_media(&provider, &MediaConfig::default()).await;
        assert!(stream.is_empty());
    }

    #[test]
    fn stopped_tracks_are_not_active() {
        let mic = LocalTrack::new(TrackKind::Audio, "mic");
        let cam = LocalTrack::new(TrackKind::Video, "cam");
        let stream = LocalStream::new(vec![mic.clone(), cam]);
        mic.stop();
        assert_eq!(stream.active_tracks().count(), 1);
        stream.stop_all();
        assert_eq!(stream.active_tracks().count(), 0);
    }

    #[test]
    fn display_constraints_from_quality() {
        let c = DisplayConstraints::from(ShareQuality::High);
        assert_eq!(c.max_width, ShareQuality::High.max_width());
        assert_eq!(c.max_fps, ShareQuality::High.max_fps());
    }
}
