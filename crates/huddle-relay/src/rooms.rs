//! Room store: maps rooms to their members' outbound channels.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_common::{PeerId, RoomId};
use tokio::sync::{mpsc, RwLock};

/// Outbound JSON frames for one socket.
pub type Outbox = mpsc::Sender<String>;

/// One joined socket.
pub struct Member {
    /// Distinguishes a rejoin from the socket it replaced.
    pub conn_id: u64,
    pub tx: Outbox,
}

#[derive(Default)]
pub struct Room {
    pub members: HashMap<PeerId, Member>,
    pub sharer: Option<PeerId>,
}

/// Result of a join.
pub struct Arrival {
    /// Channels of everyone else in the room.
    pub others: Vec<Outbox>,
    /// Set when the user id already had a socket here.
    pub replaced: Option<Replaced>,
}

pub struct Replaced {
    pub was_sharer: bool,
}

/// What a departure left behind.
pub struct Departure {
    /// Channels of the members still in the room.
    pub remaining: Vec<Outbox>,
    pub was_sharer: bool,
}

/// Thread-safe room store.
#[derive(Clone, Default)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user` to `room`, replacing any earlier socket with the same user
    /// id. A replaced member counts as having left: its sharer slot is freed.
    pub async fn join(&self, room: &RoomId, user: &PeerId, conn_id: u64, tx: Outbox) -> Arrival {
        let mut map = self.rooms.write().await;
        let entry = map.entry(room.clone()).or_default();

        let replaced = entry
            .members
            .insert(user.clone(), Member { conn_id, tx })
            .map(|previous| {
                let was_sharer = entry.sharer.as_ref() == Some(user);
                if was_sharer {
                    entry.sharer = None;
                }
                tracing::info!(
                    room = %room,
                    user = %user,
                    old_conn = previous.conn_id,
                    was_sharer,
                    "Rejoin replaced previous connection"
                );
                Replaced { was_sharer }
            });

        let others = entry
            .members
            .iter()
            .filter(|(id, _)| *id != user)
            .map(|(_, m)| m.tx.clone())
            .collect();
        Arrival { others, replaced }
    }

    /// Channel of a member, for targeted forwarding.
    pub async fn member_tx(&self, room: &RoomId, user: &PeerId) -> Option<Outbox> {
        let map = self.rooms.read().await;
        map.get(room)?.members.get(user).map(|m| m.tx.clone())
    }

    /// Channels of every member of `room` except `user`.
    pub async fn others(&self, room: &RoomId, user: &PeerId) -> Vec<Outbox> {
        let map = self.rooms.read().await;
        map.get(room)
            .map(|r| {
                r.members
                    .iter()
                    .filter(|(id, _)| *id != user)
                    .map(|(_, m)| m.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn sharer(&self, room: &RoomId) -> Option<PeerId> {
        let map = self.rooms.read().await;
        map.get(room)?.sharer.clone()
    }

    /// Record `user` as the room's sharer. Returns `true` if that changed.
    pub async fn mark_sharer(&self, room: &RoomId, user: &PeerId) -> bool {
        let mut map = self.rooms.write().await;
        let Some(entry) = map.get_mut(room) else {
            return false;
        };
        if entry.sharer.as_ref() == Some(user) {
            return false;
        }
        entry.sharer = Some(user.clone());
        true
    }

    /// Clear the sharer slot if `user` holds it.
    pub async fn release_sharer(&self, room: &RoomId, user: &PeerId) -> bool {
        let mut map = self.rooms.write().await;
        match map.get_mut(room) {
            Some(entry) if entry.sharer.as_ref() == Some(user) => {
                entry.sharer = None;
                true
            }
            _ => false,
        }
    }

    /// Remove `user` if `conn_id` is still its socket. Empty rooms are
    /// deleted. `None` when the member was already gone or replaced.
    pub async fn leave(&self, room: &RoomId, user: &PeerId, conn_id: u64) -> Option<Departure> {
        let mut map = self.rooms.write().await;
        let entry = map.get_mut(room)?;
        if entry.members.get(user).map(|m| m.conn_id) != Some(conn_id) {
            return None;
        }
        entry.members.remove(user);

        let was_sharer = entry.sharer.as_ref() == Some(user);
        if was_sharer {
            entry.sharer = None;
        }
        let remaining: Vec<Outbox> = entry.members.values().map(|m| m.tx.clone()).collect();
        if entry.members.is_empty() {
            map.remove(room);
            tracing::debug!(room = %room, "Room emptied");
        }
        Some(Departure {
            remaining,
            was_sharer,
        })
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn member_count(&self, room: &RoomId) -> usize {
        let map = self.rooms.read().await;
        map.get(room).map(|r| r.members.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> (Outbox, mpsc::Receiver<String>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn join_returns_only_others() {
        let store = RoomStore::new();
        let room = RoomId::from("r1");
        let (a, _ra) = outbox();
        let (b, _rb) = outbox();

        let first = store.join(&room, &PeerId::from("alice"), 1, a).await;
        assert!(first.others.is_empty());
        assert!(first.replaced.is_none());
        assert_eq!(store.join(&room, &PeerId::from("bob"), 2, b).await.others.len(), 1);
        assert_eq!(store.member_count(&room).await, 2);
    }

    #[tokio::test]
    async fn rejoin_replaces_and_old_socket_cannot_evict() {
        let store = RoomStore::new();
        let room = RoomId::from("r1");
        let alice = PeerId::from("alice");
        let (old, _r1) = outbox();
        let (new, _r2) = outbox();

        store.join(&room, &alice, 1, old).await;
        let arrival = store.join(&room, &alice, 2, new).await;
        assert!(matches!(arrival.replaced, Some(Replaced { was_sharer: false })));
        assert_eq!(store.member_count(&room).await, 1);

        assert!(store.leave(&room, &alice, 1).await.is_none());
        assert_eq!(store.member_count(&room).await, 1);
        assert!(store.leave(&room, &alice, 2).await.is_some());
    }

    #[tokio::test]
    async fn last_leave_deletes_room() {
        let store = RoomStore::new();
        let room = RoomId::from("r1");
        let (a, _ra) = outbox();
        let (b, _rb) = outbox();
        store.join(&room, &PeerId::from("alice"), 1, a).await;
        store.join(&room, &PeerId::from("bob"), 2, b).await;

        let departure = store.leave(&room, &PeerId::from("alice"), 1).await.unwrap();
        assert_eq!(departure.remaining.len(), 1);
        assert_eq!(store.room_count().await, 1);

        let departure = store.leave(&room, &PeerId::from("bob"), 2).await.unwrap();
        assert!(departure.remaining.is_empty());
        assert_eq!(store.room_count().await, 0);
    }

    #[tokio::test]
    async fn sharer_slot_follows_marks_and_departures() {
        let store = RoomStore::new();
        let room = RoomId::from("r1");
        let alice = PeerId::from("alice");
        let bob = PeerId::from("bob");
        let (a, _ra) = outbox();
        let (b, _rb) = outbox();
        store.join(&room, &alice, 1, a).await;
        store.join(&room, &bob, 2, b).await;

        assert!(store.mark_sharer(&room, &alice).await);
        assert!(!store.mark_sharer(&room, &alice).await);
        assert_eq!(store.sharer(&room).await, Some(alice.clone()));

        assert!(!store.release_sharer(&room, &bob).await);
        let departure = store.leave(&room, &alice, 1).await.unwrap();
        assert!(departure.was_sharer);
        assert_eq!(store.sharer(&room).await, None);
    }

    #[tokio::test]
    async fn rejoin_frees_the_sharer_slot() {
        let store = RoomStore::new();
        let room = RoomId::from("r1");
        let alice = PeerId::from("alice");
        let (old, _r1) = outbox();
        let (new, _r2) = outbox();

        store.join(&room, &alice, 1, old).await;
        assert!(store.mark_sharer(&room, &alice).await);

        let arrival = store.join(&room, &alice, 2, new).await;
        assert!(matches!(arrival.replaced, Some(Replaced { was_sharer: true })));
        assert_eq!(store.sharer(&room).await, None);
    }

    #[tokio::test]
    async fn unknown_room_lookups_are_empty() {
        let store = RoomStore::new();
        let room = RoomId::from("nowhere");
        assert!(store.member_tx(&room, &PeerId::from("x")).await.is_none());
        assert!(store.others(&room, &PeerId::from("x")).await.is_empty());
        assert!(!store.mark_sharer(&room, &PeerId::from("x")).await);
    }
}
