//! Session lifecycles.
//!
//! One session per live connection. A session owns the authenticated
//! identity and the registry memberships it joined, translates inbound
//! wire frames to core events, and filters outbound events back into
//! wire frames. The WebSocket glue lives in `handlers`; everything here
//! is socket-free so the lifecycle rules can be tested directly.

use crate::auth::UserIdentity;
use crate::metrics;
use courier_core::event::{ChatMessage, EventKind, RoomEvent};
use courier_core::gateway::{Gateway, GatewayError};
use courier_core::presence::PresenceRegistry;
use courier_core::registry::RoomRegistry;
use courier_core::room::RoomKey;
use courier_core::ConnectionId;
use courier_protocol::{codec, ClientFrame, ProtocolError, ServerFrame};
use std::sync::Arc;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// Format a unix timestamp as the wire protocol's `HH:MM` (UTC).
#[must_use]
pub fn format_clock(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|t| t.format(CLOCK_FORMAT).ok())
        .unwrap_or_else(|| "00:00".to_string())
}

/// Errors while handling a single inbound frame.
///
/// None of these close the connection; the offending frame is dropped.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Frame failed to decode.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Durable write failed; nothing derived from the frame was
    /// broadcast.
    #[error("Persistence failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// Error class label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SessionError::Protocol(_) => "protocol",
            SessionError::Gateway(_) => "persistence",
        }
    }
}

/// A direct-chat session: relays messages and typing indicators within
/// one 1:1 room, persisting messages before fan-out.
///
/// Lifecycle: `open` (Connecting → Joined) … `close` (Joined → Closed).
pub struct ChatSession {
    connection: ConnectionId,
    me: UserIdentity,
    peer_id: i64,
    room: RoomKey,
    registry: Arc<RoomRegistry>,
    presence: Arc<PresenceRegistry>,
    gateway: Arc<dyn Gateway>,
    joined: bool,
}

impl ChatSession {
    /// Join the room for `(me, peer_id)` and flip the user online.
    ///
    /// The durable status write completes before the online event is
    /// broadcast to the room; if the write fails the event is withheld
    /// and the session still joins.
    pub async fn open(
        registry: Arc<RoomRegistry>,
        presence: Arc<PresenceRegistry>,
        gateway: Arc<dyn Gateway>,
        me: UserIdentity,
        peer_id: i64,
    ) -> (Self, broadcast::Receiver<Arc<RoomEvent>>) {
        let connection = ConnectionId::generate();
        let room = RoomKey::for_pair(me.id, peer_id);

        let receiver = registry.join(&room, &connection);
        debug!(connection = %connection, room = %room, user_id = me.id, "Chat session joined");

        let session = Self {
            connection,
            me,
            peer_id,
            room,
            registry,
            presence,
            gateway,
            joined: true,
        };

        match session.presence.set_status(session.me.id, true).await {
            Ok(change) if change.transitioned() => {
                session.registry.broadcast(
                    &session.room,
                    RoomEvent::new(EventKind::Status {
                        user_id: session.me.id,
                        online: true,
                    })
                    .with_origin(session.connection.clone()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = session.me.id, error = %e, "Online status write failed");
                metrics::record_error("persistence");
            }
        }

        (session, receiver)
    }

    /// The session's connection id.
    #[must_use]
    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    /// Whether the session is still in the Joined state.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Handle one inbound text frame.
    ///
    /// Typing indicators are re-broadcast without persistence. Messages
    /// are persisted first and broadcast only from the durable record;
    /// whitespace-only content is dropped silently.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed frames and failed durable writes.
    /// Either way the frame is dropped and the session stays joined.
    pub async fn handle_frame(&self, text: &str) -> Result<(), SessionError> {
        match codec::decode(text)? {
            ClientFrame::Typing { is_typing } => {
                self.registry.broadcast(
                    &self.room,
                    RoomEvent::new(EventKind::Typing {
                        user_id: self.me.id,
                        is_typing,
                    })
                    .with_origin(self.connection.clone()),
                );
                Ok(())
            }

            ClientFrame::Message { message } => {
                let content = message.trim();
                if content.is_empty() {
                    return Ok(());
                }

                let record = self
                    .gateway
                    .create_message(self.me.id, self.peer_id, content)
                    .await?;
                metrics::record_message_persisted();

                self.registry.broadcast(
                    &self.room,
                    RoomEvent::new(EventKind::Message(ChatMessage {
                        id: record.id,
                        sender_id: self.me.id,
                        sender_name: self.me.username.clone(),
                        content: content.to_string(),
                        timestamp: record.timestamp,
                        read: false,
                    }))
                    .with_origin(self.connection.clone()),
                );
                Ok(())
            }
        }
    }

    /// Translate a room event into an outbound frame, or `None` when
    /// delivery to this session is suppressed (own typing indicator).
    #[must_use]
    pub fn outbound(&self, event: &RoomEvent) -> Option<ServerFrame> {
        if event.suppressed_for(&self.connection) {
            return None;
        }
        Some(frame_for(event))
    }

    /// Leave the room and flip the user offline. Runs the cleanup
    /// exactly once, whether the disconnect was voluntary or abnormal.
    pub async fn close(&mut self) {
        if !self.joined {
            return;
        }
        self.joined = false;

        self.registry.leave(&self.room, &self.connection);

        match self.presence.set_status(self.me.id, false).await {
            Ok(change) if change.transitioned() => {
                self.registry.broadcast(
                    &self.room,
                    RoomEvent::new(EventKind::Status {
                        user_id: self.me.id,
                        online: false,
                    })
                    .with_origin(self.connection.clone()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = self.me.id, error = %e, "Offline status write failed");
                metrics::record_error("persistence");
            }
        }

        debug!(connection = %self.connection, room = %self.room, "Chat session closed");
    }
}

/// A presence-only session: joins the process-wide group, flips status,
/// and relays online/offline transitions. Inbound application data on
/// this channel is ignored; it is output-only from the server's
/// perspective.
pub struct PresenceSession {
    connection: ConnectionId,
    me: UserIdentity,
    presence: Arc<PresenceRegistry>,
    joined: bool,
}

impl PresenceSession {
    /// Join the global presence group and flip the user online.
    pub async fn open(
        presence: Arc<PresenceRegistry>,
        me: UserIdentity,
    ) -> (Self, broadcast::Receiver<Arc<RoomEvent>>) {
        let connection = ConnectionId::generate();
        let receiver = presence.join(&connection);
        debug!(connection = %connection, user_id = me.id, "Presence session joined");

        let session = Self {
            connection,
            me,
            presence,
            joined: true,
        };

        match session.presence.set_status(session.me.id, true).await {
            Ok(change) if change.transitioned() => {
                session.presence.broadcast(
                    RoomEvent::new(EventKind::Status {
                        user_id: session.me.id,
                        online: true,
                    })
                    .with_origin(session.connection.clone()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = session.me.id, error = %e, "Online status write failed");
                metrics::record_error("persistence");
            }
        }

        (session, receiver)
    }

    /// The session's connection id.
    #[must_use]
    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    /// Translate a group event into an outbound frame.
    #[must_use]
    pub fn outbound(&self, event: &RoomEvent) -> Option<ServerFrame> {
        if event.suppressed_for(&self.connection) {
            return None;
        }
        Some(frame_for(event))
    }

    /// Flip the user offline and leave the group, exactly once.
    pub async fn close(&mut self) {
        if !self.joined {
            return;
        }
        self.joined = false;

        match self.presence.set_status(self.me.id, false).await {
            Ok(change) if change.transitioned() => {
                self.presence.broadcast(
                    RoomEvent::new(EventKind::Status {
                        user_id: self.me.id,
                        online: false,
                    })
                    .with_origin(self.connection.clone()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = self.me.id, error = %e, "Offline status write failed");
                metrics::record_error("persistence");
            }
        }

        self.presence.leave(&self.connection);
        debug!(connection = %self.connection, "Presence session closed");
    }
}

/// Render a core event as its wire frame.
fn frame_for(event: &RoomEvent) -> ServerFrame {
    match &event.kind {
        EventKind::Message(message) => ServerFrame::Message {
            message_id: message.id,
            message: message.content.clone(),
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            timestamp: format_clock(message.timestamp),
            is_read: message.read,
        },
        EventKind::Typing { user_id, is_typing } => ServerFrame::typing(*user_id, *is_typing),
        EventKind::Status { user_id, online } => ServerFrame::status(*user_id, *online),
    }
}
