//! Signaling wire protocol shared by the call coordinator and the relay.
//!
//! Every frame is a JSON object tagged by `type`, whose value is the event
//! name. Targeted events carry the sender in `user_id` and the recipient in
//! `target_user_id`; room announcements name the peer in `userId`.

use serde::{Deserialize, Serialize};

use crate::id::{PeerId, RoomId};

// ---------------------------------------------------------------------------
// Session descriptions and candidates
// ---------------------------------------------------------------------------

/// Which half of the offer/answer exchange a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob plus its role, shaped like `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled ICE candidate, shaped like `RTCIceCandidateInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

// ---------------------------------------------------------------------------
// Targeted payloads
// ---------------------------------------------------------------------------

/// Payload of `offer`, `answer`, `screen_offer` and `screen_answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpPayload {
    pub room_id: RoomId,
    pub user_id: PeerId,
    pub target_user_id: PeerId,
    pub sdp: SessionDescription,
}

/// Payload of `ice-candidate` and `screen_ice_candidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub room_id: RoomId,
    pub user_id: PeerId,
    pub target_user_id: PeerId,
    pub candidate: IceCandidate,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One signaling frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Client → relay: enter a room.
    #[serde(rename = "join")]
    Join { room_id: RoomId, user_id: PeerId },

    /// Relay → room: someone entered.
    #[serde(rename = "user_joined")]
    UserJoined {
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: PeerId,
    },

    /// Relay → room: someone left or dropped.
    #[serde(rename = "user_left")]
    UserLeft {
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: PeerId,
    },

    #[serde(rename = "offer")]
    Offer(SdpPayload),

    #[serde(rename = "answer")]
    Answer(SdpPayload),

    #[serde(rename = "ice-candidate")]
    IceCandidate(CandidatePayload),

    #[serde(rename = "screen_offer")]
    ScreenOffer(SdpPayload),

    #[serde(rename = "screen_answer")]
    ScreenAnswer(SdpPayload),

    #[serde(rename = "screen_ice_candidate")]
    ScreenIceCandidate(CandidatePayload),

    /// Relay → sender: a screen offer was refused.
    #[serde(rename = "screen_sharing_error")]
    ScreenSharingError { message: String },

    /// Relay → room: a member became the room's screen sharer.
    #[serde(rename = "screen_sharing_started")]
    ScreenSharingStarted {
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: PeerId,
    },

    /// Sharer → relay → room: sharing ended. Accepted from clients that send
    /// it; the coordinator itself never does.
    #[serde(rename = "screen_share_stopped")]
    ScreenShareStopped {
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: PeerId,
    },

    /// Client → relay: explicit departure.
    #[serde(rename = "disconnect_call")]
    DisconnectCall { room_id: RoomId, user_id: PeerId },
}

impl SignalMessage {
    /// Wire name of this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::ScreenOffer(_) => "screen_offer",
            Self::ScreenAnswer(_) => "screen_answer",
            Self::ScreenIceCandidate(_) => "screen_ice_candidate",
            Self::ScreenSharingError { .. } => "screen_sharing_error",
            Self::ScreenSharingStarted { .. } => "screen_sharing_started",
            Self::ScreenShareStopped { .. } => "screen_share_stopped",
            Self::DisconnectCall { .. } => "disconnect_call",
        }
    }

    /// The peer a unicast event is addressed to, if it is one.
    pub fn target(&self) -> Option<&PeerId> {
        match self {
            Self::Offer(p) | Self::Answer(p) | Self::ScreenOffer(p) | Self::ScreenAnswer(p) => {
                Some(&p.target_user_id)
            }
            Self::IceCandidate(p) | Self::ScreenIceCandidate(p) => Some(&p.target_user_id),
            _ => None,
        }
    }

    /// The peer that originated a client-sent event.
    pub fn sender(&self) -> Option<&PeerId> {
        match self {
            Self::Join { user_id, .. }
            | Self::DisconnectCall { user_id, .. }
            | Self::ScreenShareStopped { user_id, .. } => Some(user_id),
            Self::Offer(p) | Self::Answer(p) | Self::ScreenOffer(p) | Self::ScreenAnswer(p) => {
                Some(&p.user_id)
            }
            Self::IceCandidate(p) | Self::ScreenIceCandidate(p) => Some(&p.user_id),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offer() -> SignalMessage {
        SignalMessage::Offer(SdpPayload {
            room_id: RoomId::from("r1"),
            user_id: PeerId::from("alice"),
            target_user_id: PeerId::from("bob"),
            sdp: SessionDescription::offer("v=0"),
        })
    }

    #[test]
    fn offer_wire_shape() {
        let value = serde_json::to_value(offer()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "offer",
                "room_id": "r1",
                "user_id": "alice",
                "target_user_id": "bob",
                "sdp": { "type": "offer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn user_joined_uses_camel_case_user_id() {
        let msg = SignalMessage::from_json(r#"{"type":"user_joined","room_id":"r1","userId":"bob"}"#)
            .unwrap();
        assert_eq!(
            msg,
            SignalMessage::UserJoined {
                room_id: RoomId::from("r1"),
                user_id: PeerId::from("bob"),
            }
        );
    }

    #[test]
    fn ice_candidate_event_name_has_hyphen() {
        let msg = SignalMessage::IceCandidate(CandidatePayload {
            room_id: RoomId::from("r1"),
            user_id: PeerId::from("alice"),
            target_user_id: PeerId::from("bob"),
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            },
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ice-candidate");
        assert_eq!(value["candidate"]["sdpMid"], "0");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 0);
        assert_eq!(msg.event_name(), "ice-candidate");
    }

    #[test]
    fn candidate_without_mid_parses() {
        let c: IceCandidate = serde_json::from_str(r#"{"candidate":"a"}"#).unwrap();
        assert_eq!(c.sdp_mid, None);
        assert_eq!(c.sdp_m_line_index, None);
    }

    #[test]
    fn sender_and_target() {
        let msg = offer();
        assert_eq!(msg.sender(), Some(&PeerId::from("alice")));
        assert_eq!(msg.target(), Some(&PeerId::from("bob")));

        let joined = SignalMessage::UserJoined {
            room_id: RoomId::from("r1"),
            user_id: PeerId::from("bob"),
        };
        assert_eq!(joined.target(), None);
        assert_eq!(joined.sender(), None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(SignalMessage::from_json(r#"{"type":"renegotiate"}"#).is_err());
    }

    #[test]
    fn screen_error_has_only_message() {
        let msg = SignalMessage::ScreenSharingError {
            message: "Another user is already sharing their screen".into(),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"screen_sharing_error","message":"Another user is already sharing their screen"}"#
        );
    }
}
