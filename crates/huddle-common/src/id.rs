use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque name of a signaling scope. Supplied by whoever routes users
/// into rooms; never generated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity of a participant as seen on the signaling channel.
///
/// A peer that leaves and rejoins may come back under a different id, so
/// nothing keyed by `PeerId` survives a `user_left`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identity (UUID v4).
    pub fn generate() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_valid_uuid() {
        let id = new_id();
        let parsed = uuid::Uuid::parse_str(&id);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn generated_peer_ids_are_unique() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn peer_id_display_matches_inner() {
        let peer = PeerId::new("alice");
        assert_eq!(peer.to_string(), "alice");
        assert_eq!(peer.as_str(), "alice");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let room = RoomId::from("a1b2c3d4");
        assert_eq!(serde_json::to_string(&room).unwrap(), "\"a1b2c3d4\"");

        let peer: PeerId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(peer, PeerId::from("bob"));
    }

    #[test]
    fn peer_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let p1 = PeerId::generate();
        set.insert(p1.clone());
        set.insert(p1);
        assert_eq!(set.len(), 1);
    }
}
