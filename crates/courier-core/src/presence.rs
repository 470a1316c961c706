//! Presence tracking for Courier.
//!
//! One process-wide group carries online/offline broadcasts, separate
//! from per-room membership. Durable status is reference-counted per
//! user: a user holding both a chat and a presence connection only goes
//! offline when the last of them disconnects.

use crate::connection::ConnectionId;
use crate::event::RoomEvent;
use crate::gateway::{Gateway, GatewayError};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity for the presence group.
const DEFAULT_GROUP_CAPACITY: usize = 1024;

/// Outcome of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The user's durable status flipped; callers broadcast the
    /// corresponding status event.
    Transitioned,
    /// Another open session keeps the status unchanged; nothing to
    /// broadcast.
    Unchanged,
}

impl StatusChange {
    /// Whether the durable status flipped.
    #[must_use]
    pub fn transitioned(self) -> bool {
        matches!(self, StatusChange::Transitioned)
    }
}

/// Registry for the process-wide presence group.
///
/// Same join/leave/broadcast shape as [`crate::registry::RoomRegistry`],
/// scoped to a single group, plus the durable status updates. The
/// durable write always completes (or fails) before the caller gets to
/// broadcast, so a status query against the store never lags behind an
/// observed broadcast.
pub struct PresenceRegistry {
    /// Broadcast sender for the global group.
    sender: broadcast::Sender<Arc<RoomEvent>>,
    /// Connections joined to the group.
    members: DashSet<ConnectionId>,
    /// Open-session count per user id, across both session kinds.
    sessions: DashMap<i64, usize>,
    /// Durable store for the online flag.
    gateway: Arc<dyn Gateway>,
}

impl PresenceRegistry {
    /// Create a new presence registry.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_capacity(gateway, DEFAULT_GROUP_CAPACITY)
    }

    /// Create a new presence registry with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(gateway: Arc<dyn Gateway>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            members: DashSet::new(),
            sessions: DashMap::new(),
            gateway,
        }
    }

    /// Join a connection to the global group.
    ///
    /// Returns a receiver for status broadcasts from this point on.
    pub fn join(&self, connection: &ConnectionId) -> broadcast::Receiver<Arc<RoomEvent>> {
        if self.members.insert(connection.clone()) {
            debug!(connection = %connection, "Joined presence group");
        }
        self.sender.subscribe()
    }

    /// Remove a connection from the global group. No-op when absent.
    pub fn leave(&self, connection: &ConnectionId) {
        if self.members.remove(connection).is_some() {
            debug!(connection = %connection, "Left presence group");
        }
    }

    /// Broadcast an event to every group member.
    ///
    /// Returns the number of receivers reached.
    pub fn broadcast(&self, event: RoomEvent) -> usize {
        trace!(kind = event.kind_label(), "Broadcasting to presence group");
        self.sender.send(Arc::new(event)).unwrap_or_default()
    }

    /// Get the number of joined connections.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Get the number of open sessions for a user.
    #[must_use]
    pub fn open_sessions(&self, user_id: i64) -> usize {
        self.sessions.get(&user_id).map(|c| *c).unwrap_or(0)
    }

    /// Record a session coming online or going offline for a user.
    ///
    /// The durable flag is only written on a real transition (first
    /// session opens, last session closes), and the write completes
    /// before the transition is reported, so callers broadcast the
    /// status event strictly after it is durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the session count
    /// still reflects the connection, and nothing should be broadcast.
    pub async fn set_status(
        &self,
        user_id: i64,
        online: bool,
    ) -> Result<StatusChange, GatewayError> {
        let transition = if online {
            let mut count = self.sessions.entry(user_id).or_insert(0);
            let first = *count == 0;
            *count += 1;
            first
        } else {
            let last = match self.sessions.get_mut(&user_id) {
                Some(mut count) if *count > 0 => {
                    *count -= 1;
                    *count == 0
                }
                _ => false,
            };
            if last {
                self.sessions.remove_if(&user_id, |_, count| *count == 0);
            }
            last
        };

        if !transition {
            return Ok(StatusChange::Unchanged);
        }

        self.gateway.set_online_status(user_id, online).await?;
        debug!(user_id, online, "Durable status transition");
        Ok(StatusChange::Transitioned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::gateway::NewMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records gateway calls; optionally fails status writes.
    #[derive(Default)]
    struct RecordingGateway {
        status_calls: Mutex<Vec<(i64, bool)>>,
        fail_status: bool,
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn create_message(
            &self,
            _sender_id: i64,
            _receiver_id: i64,
            _content: &str,
        ) -> Result<NewMessage, GatewayError> {
            Ok(NewMessage { id: 1, timestamp: 0 })
        }

        async fn set_online_status(
            &self,
            user_id: i64,
            online: bool,
        ) -> Result<(), GatewayError> {
            if self.fail_status {
                return Err(GatewayError::Persistence("disk full".into()));
            }
            self.status_calls.lock().unwrap().push((user_id, online));
            Ok(())
        }
    }

    fn registry_with(gateway: RecordingGateway) -> (PresenceRegistry, Arc<RecordingGateway>) {
        let gateway = Arc::new(gateway);
        (PresenceRegistry::new(gateway.clone()), gateway)
    }

    #[tokio::test]
    async fn test_single_session_transitions_both_ways() {
        let (presence, gateway) = registry_with(RecordingGateway::default());

        assert!(presence.set_status(1, true).await.unwrap().transitioned());
        assert!(presence.set_status(1, false).await.unwrap().transitioned());

        assert_eq!(
            *gateway.status_calls.lock().unwrap(),
            vec![(1, true), (1, false)]
        );
    }

    #[tokio::test]
    async fn test_second_session_does_not_retransition() {
        let (presence, gateway) = registry_with(RecordingGateway::default());

        // Chat and presence connection for the same user.
        assert!(presence.set_status(1, true).await.unwrap().transitioned());
        assert!(!presence.set_status(1, true).await.unwrap().transitioned());
        assert_eq!(presence.open_sessions(1), 2);

        // First disconnect leaves the user online.
        assert!(!presence.set_status(1, false).await.unwrap().transitioned());
        assert_eq!(presence.open_sessions(1), 1);

        // Last disconnect flips the durable flag exactly once.
        assert!(presence.set_status(1, false).await.unwrap().transitioned());
        assert_eq!(
            *gateway.status_calls.lock().unwrap(),
            vec![(1, true), (1, false)]
        );
    }

    #[tokio::test]
    async fn test_offline_without_session_is_unchanged() {
        let (presence, gateway) = registry_with(RecordingGateway::default());

        assert!(!presence.set_status(9, false).await.unwrap().transitioned());
        assert!(gateway.status_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_surfaces() {
        let (presence, _) = registry_with(RecordingGateway {
            fail_status: true,
            ..Default::default()
        });

        assert!(matches!(
            presence.set_status(1, true).await,
            Err(GatewayError::Persistence(_))
        ));
        // The connection is still counted as open.
        assert_eq!(presence.open_sessions(1), 1);
    }

    #[tokio::test]
    async fn test_group_join_broadcast_leave() {
        let (presence, _) = registry_with(RecordingGateway::default());

        let mut rx1 = presence.join(&"conn-1".into());
        let _rx2 = presence.join(&"conn-2".into());
        assert_eq!(presence.member_count(), 2);

        let count = presence.broadcast(RoomEvent::new(EventKind::Status {
            user_id: 2,
            online: true,
        }));
        assert_eq!(count, 2);
        assert!(rx1.recv().await.is_ok());

        presence.leave(&"conn-1".into());
        presence.leave(&"conn-1".into()); // idempotent
        assert_eq!(presence.member_count(), 1);
    }
}
