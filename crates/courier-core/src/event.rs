//! Internal event types for Courier.
//!
//! Events are what the registries fan out to member sessions. Each
//! session translates them to outbound wire frames, applying the
//! per-event delivery rule (typing indicators never echo to their
//! originating session).

use crate::connection::ConnectionId;

/// A durably persisted chat message, ready for fan-out.
///
/// Built from the persistence gateway's record after the write lands,
/// never speculatively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Persisted message id.
    pub id: i64,
    /// Sender user id.
    pub sender_id: i64,
    /// Sender display name.
    pub sender_name: String,
    /// Message body, already trimmed and non-empty.
    pub content: String,
    /// Server-assigned unix timestamp (seconds).
    pub timestamp: i64,
    /// Read flag, always false at fan-out time.
    pub read: bool,
}

/// The kinds of events a room or the presence group can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A persisted chat message. Delivered to every member including the
    /// sender, so the sender's UI sees the assigned id and timestamp.
    Message(ChatMessage),

    /// Typing indicator. Delivered to every member except the origin.
    Typing { user_id: i64, is_typing: bool },

    /// Online/offline transition for a user.
    Status { user_id: i64, online: bool },
}

/// An event dispatched through a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEvent {
    /// Connection the event originated from, if any.
    pub origin: Option<ConnectionId>,
    /// Event payload.
    pub kind: EventKind,
}

impl RoomEvent {
    /// Create a new event with no origin.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self { origin: None, kind }
    }

    /// Tag the event with its originating connection.
    #[must_use]
    pub fn with_origin(mut self, origin: ConnectionId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Whether delivery to `connection` must be suppressed.
    ///
    /// Typing indicators are the only event class with an exclusion
    /// rule: the originating session never receives its own indicator.
    /// Chat messages and status events are delivered to every member,
    /// origin included.
    #[must_use]
    pub fn suppressed_for(&self, connection: &ConnectionId) -> bool {
        matches!(self.kind, EventKind::Typing { .. }) && self.origin.as_ref() == Some(connection)
    }

    /// Get the event kind as a static label (for logging).
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EventKind::Message(_) => "message",
            EventKind::Typing { .. } => "typing",
            EventKind::Status { .. } => "status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing_event(origin: &ConnectionId) -> RoomEvent {
        RoomEvent::new(EventKind::Typing {
            user_id: 1,
            is_typing: true,
        })
        .with_origin(origin.clone())
    }

    #[test]
    fn test_typing_suppressed_for_origin_only() {
        let me = ConnectionId::from("conn-1");
        let other = ConnectionId::from("conn-2");

        let event = typing_event(&me);
        assert!(event.suppressed_for(&me));
        assert!(!event.suppressed_for(&other));
    }

    #[test]
    fn test_message_echoes_to_origin() {
        let me = ConnectionId::from("conn-1");
        let event = RoomEvent::new(EventKind::Message(ChatMessage {
            id: 1,
            sender_id: 1,
            sender_name: "alice".into(),
            content: "hi".into(),
            timestamp: 0,
            read: false,
        }))
        .with_origin(me.clone());

        assert!(!event.suppressed_for(&me));
    }

    #[test]
    fn test_status_never_suppressed() {
        let me = ConnectionId::from("conn-1");
        let event = RoomEvent::new(EventKind::Status {
            user_id: 1,
            online: false,
        })
        .with_origin(me.clone());

        assert!(!event.suppressed_for(&me));
    }
}
