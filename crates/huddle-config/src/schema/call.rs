//! Call-side configuration: ICE, negotiation, local media and screen share.

use serde::{Deserialize, Serialize};

/// One ICE server entry, shaped like `RTCIceServer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
}

/// ICE settings handed to every new peer connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
    pub candidate_pool_size: u8,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".into()],
            }],
            candidate_pool_size: 10,
        }
    }
}

/// Offer/answer exchange settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Seconds a connection may stay in flight before it is closed.
    /// `0` disables the timer.
    pub timeout_secs: u64,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Local capture preference. Acquisition starts here and degrades
/// (video+audio, then audio only, then nothing).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub video: bool,
    pub audio: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Quality preset for display capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareQuality {
    /// 720p at 10fps for low bandwidth.
    Low,
    /// 1080p, 15fps.
    #[default]
    Medium,
    /// 1080p, 30fps.
    High,
    /// Native resolution, 30fps.
    Ultra,
}

impl ShareQuality {
    pub fn max_width(&self) -> u32 {
        match self {
            Self::Low => 1280,
            Self::Medium | Self::High => 1920,
            Self::Ultra => 3840,
        }
    }

    pub fn max_height(&self) -> u32 {
        match self {
            Self::Low => 720,
            Self::Medium | Self::High => 1080,
            Self::Ultra => 2160,
        }
    }

    pub fn max_fps(&self) -> u32 {
        match self {
            Self::Low => 10,
            Self::Medium => 15,
            Self::High | Self::Ultra => 30,
        }
    }
}

/// Screen sharing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenShareConfig {
    pub enabled: bool,
    pub quality: ShareQuality,
}

impl Default for ScreenShareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: ShareQuality::Medium,
        }
    }
}
