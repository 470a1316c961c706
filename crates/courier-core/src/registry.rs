//! Room registry for Courier.
//!
//! The registry maps room keys to live rooms and multiplexes events to
//! the correct subset of connections. It is constructed once at process
//! start and shared by handle with every session task; there are no
//! module-level globals.

use crate::connection::ConnectionId;
use crate::event::RoomEvent;
use crate::room::{Room, RoomKey};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Default broadcast capacity per room.
const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Registry of live 1:1 conversation rooms.
///
/// Rooms are created lazily on first join and garbage-collected when the
/// last member leaves. Membership mutation happens under the room's map
/// entry lock, so a join/leave never interleaves with another mutation
/// of the same room; broadcast delivery is a snapshot of the receivers
/// subscribed at dispatch time.
pub struct RoomRegistry {
    /// Rooms indexed by key.
    rooms: DashMap<RoomKey, Room>,
    /// Broadcast capacity for newly created rooms.
    capacity: usize,
}

impl RoomRegistry {
    /// Create a new registry with the default room capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Create a new registry with a specific per-room capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        info!(capacity, "Creating room registry");
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Join a connection to a room, creating the room if needed.
    ///
    /// Returns a receiver for events dispatched to the room from this
    /// point on. Idempotent with respect to membership.
    pub fn join(
        &self,
        key: &RoomKey,
        connection: &ConnectionId,
    ) -> broadcast::Receiver<Arc<RoomEvent>> {
        let mut room = self.rooms.entry(key.clone()).or_insert_with(|| {
            debug!(room = %key, "Creating room");
            Room::with_capacity(key.clone(), self.capacity)
        });

        room.join(connection.clone())
    }

    /// Remove a connection from a room.
    ///
    /// A no-op if the room does not exist or the connection is not a
    /// member. Empty rooms are dropped here; no explicit room-deletion
    /// event exists.
    pub fn leave(&self, key: &RoomKey, connection: &ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(key) {
            room.leave(connection);

            if room.is_empty() {
                drop(room); // Release the entry lock
                self.rooms.remove(key);
                debug!(room = %key, "Dropped empty room");
            }
        }
    }

    /// Broadcast an event to every member of a room.
    ///
    /// Returns the number of receivers reached; dispatching to a missing
    /// room reaches nobody.
    pub fn broadcast(&self, key: &RoomKey, event: RoomEvent) -> usize {
        if let Some(room) = self.rooms.get(key) {
            room.broadcast(event)
        } else {
            // Normal when the last member's teardown broadcasts its own
            // offline transition.
            debug!(room = %key, "Broadcast to non-existent room");
            0
        }
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, key: &RoomKey) -> bool {
        self.rooms.contains_key(key)
    }

    /// Get the member count for a room.
    #[must_use]
    pub fn member_count(&self, key: &RoomKey) -> usize {
        self.rooms.get(key).map(|r| r.member_count()).unwrap_or(0)
    }

    /// Get the number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn status_event(user_id: i64, online: bool) -> RoomEvent {
        RoomEvent::new(EventKind::Status { user_id, online })
    }

    #[test]
    fn test_registry_join_leave() {
        let registry = RoomRegistry::new();
        let key = RoomKey::for_pair(1, 2);

        let rx = registry.join(&key, &"conn-1".into());
        assert!(registry.room_exists(&key));
        assert_eq!(registry.member_count(&key), 1);
        drop(rx);

        registry.leave(&key, &"conn-1".into());
        // Room is garbage-collected when the last member leaves.
        assert!(!registry.room_exists(&key));
    }

    #[test]
    fn test_leave_absent_is_noop() {
        let registry = RoomRegistry::new();
        let key = RoomKey::for_pair(1, 2);

        let _rx = registry.join(&key, &"conn-1".into());

        // Neither an unknown connection nor an unknown room panics or
        // disturbs existing members.
        registry.leave(&key, &"conn-9".into());
        registry.leave(&RoomKey::for_pair(8, 9), &"conn-1".into());
        assert_eq!(registry.member_count(&key), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let registry = RoomRegistry::new();
        let key = RoomKey::for_pair(1, 2);

        let mut rx1 = registry.join(&key, &"conn-1".into());
        let mut rx2 = registry.join(&key, &"conn-2".into());

        let count = registry.broadcast(&key, status_event(1, true));
        assert_eq!(count, 2);

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_after_leave_skips_leaver() {
        let registry = RoomRegistry::new();
        let key = RoomKey::for_pair(1, 2);

        let rx1 = registry.join(&key, &"conn-1".into());
        let _rx2 = registry.join(&key, &"conn-2".into());

        // The leaver drops its receiver as part of teardown.
        registry.leave(&key, &"conn-1".into());
        drop(rx1);

        let count = registry.broadcast(&key, status_event(1, false));
        assert_eq!(count, 1);
    }

    #[test]
    fn test_broadcast_missing_room() {
        let registry = RoomRegistry::new();
        assert_eq!(
            registry.broadcast(&RoomKey::for_pair(5, 6), status_event(5, true)),
            0
        );
    }

    #[tokio::test]
    async fn test_late_joiner_receives_subsequent_events() {
        let registry = RoomRegistry::new();
        let key = RoomKey::for_pair(1, 2);

        let _rx1 = registry.join(&key, &"conn-1".into());
        registry.broadcast(&key, status_event(1, true));

        // Joins after a dispatch only see later events.
        let mut rx2 = registry.join(&key, &"conn-2".into());
        assert!(rx2.try_recv().is_err());

        registry.broadcast(&key, status_event(2, true));
        let event = rx2.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            EventKind::Status {
                user_id: 2,
                online: true
            }
        ));
    }
}
