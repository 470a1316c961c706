//! Room abstraction for Courier.
//!
//! A room is the set of connections subscribed to one 1:1 conversation's
//! events. Both participants derive the same room from the unordered
//! pair of their user ids.

use crate::connection::ConnectionId;
use crate::event::RoomEvent;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity per room.
const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Key identifying a 1:1 conversation room.
///
/// Canonicalized by sorting the user-id pair, so
/// `RoomKey::for_pair(a, b) == RoomKey::for_pair(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey(String);

impl RoomKey {
    /// Derive the room key for an unordered pair of user ids.
    #[must_use]
    pub fn for_pair(a: i64, b: i64) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("chat_{lo}_{hi}"))
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A room's live state: membership set plus its broadcast channel.
#[derive(Debug)]
pub struct Room {
    /// Room key.
    key: RoomKey,
    /// Broadcast sender for this room.
    sender: broadcast::Sender<Arc<RoomEvent>>,
    /// Set of joined connection IDs.
    members: HashSet<ConnectionId>,
}

impl Room {
    /// Create a new room with the default capacity.
    #[must_use]
    pub fn new(key: RoomKey) -> Self {
        Self::with_capacity(key, DEFAULT_ROOM_CAPACITY)
    }

    /// Create a new room with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(key: RoomKey, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            key,
            sender,
            members: HashSet::new(),
        }
    }

    /// Get the room key.
    #[must_use]
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Get the number of joined connections.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if a connection is joined.
    #[must_use]
    pub fn is_member(&self, connection: &ConnectionId) -> bool {
        self.members.contains(connection)
    }

    /// Join a connection to this room.
    ///
    /// Idempotent: re-joining replaces nothing and simply hands back a
    /// fresh receiver subscribed from this point on.
    pub fn join(&mut self, connection: ConnectionId) -> broadcast::Receiver<Arc<RoomEvent>> {
        if self.members.insert(connection.clone()) {
            debug!(room = %self.key, connection = %connection, "Connection joined");
        }
        self.sender.subscribe()
    }

    /// Remove a connection from this room.
    ///
    /// Returns `true` if the connection was a member; leaving a room one
    /// is not in is a no-op.
    pub fn leave(&mut self, connection: &ConnectionId) -> bool {
        let removed = self.members.remove(connection);
        if removed {
            debug!(room = %self.key, connection = %connection, "Connection left");
        }
        removed
    }

    /// Broadcast an event to every joined connection.
    ///
    /// Delivery is a snapshot of membership at dispatch time: receivers
    /// subscribed before the send receive the event, a connection that
    /// has dropped its receiver does not.
    ///
    /// Returns the number of receivers the event reached.
    pub fn broadcast(&self, event: RoomEvent) -> usize {
        trace!(room = %self.key, kind = event.kind_label(), "Broadcasting event");
        self.sender.send(Arc::new(event)).unwrap_or_default()
    }

    /// Check if the room is empty (no joined connections).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_room_key_pair_order_independent() {
        assert_eq!(RoomKey::for_pair(1, 2), RoomKey::for_pair(2, 1));
        assert_eq!(RoomKey::for_pair(7, 7), RoomKey::for_pair(7, 7));
        assert_eq!(RoomKey::for_pair(3, 12).as_str(), "chat_3_12");
    }

    #[test]
    fn test_room_join_leave() {
        let mut room = Room::new(RoomKey::for_pair(1, 2));

        let _rx = room.join("conn-1".into());
        assert_eq!(room.member_count(), 1);
        assert!(room.is_member(&"conn-1".into()));

        let _rx2 = room.join("conn-2".into());
        assert_eq!(room.member_count(), 2);

        assert!(room.leave(&"conn-1".into()));
        assert_eq!(room.member_count(), 1);

        // Leaving when absent is a no-op.
        assert!(!room.leave(&"conn-1".into()));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_join_is_idempotent_on_membership() {
        let mut room = Room::new(RoomKey::for_pair(1, 2));
        let _rx1 = room.join("conn-1".into());
        let _rx2 = room.join("conn-1".into());
        assert_eq!(room.member_count(), 1);
    }

    #[tokio::test]
    async fn test_room_broadcast() {
        let mut room = Room::new(RoomKey::for_pair(1, 2));
        let mut rx = room.join("conn-1".into());

        let count = room.broadcast(RoomEvent::new(EventKind::Status {
            user_id: 2,
            online: true,
        }));
        assert_eq!(count, 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            EventKind::Status {
                user_id: 2,
                online: true
            }
        ));
    }
}
