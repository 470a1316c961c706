//! Frame types for the Courier wire protocol.
//!
//! Frames are JSON text objects exchanged over a persistent WebSocket
//! connection, dispatched on their `type` field.

use serde::{Deserialize, Serialize};

/// A frame received from a client.
///
/// Clients on the chat endpoint send exactly two frame kinds. A frame
/// without a `type` field is treated as a `message` frame (see
/// [`crate::codec::decode`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Typing-indicator toggle. Never persisted.
    Typing {
        /// Whether the sender is currently typing.
        #[serde(default)]
        is_typing: bool,
    },

    /// A chat message to deliver to the counterpart.
    Message {
        /// Message body. Missing field is equivalent to an empty body,
        /// which the session drops silently.
        #[serde(default)]
        message: String,
    },
}

impl ClientFrame {
    /// Get the frame kind as a static label (for logging).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Typing { .. } => "typing",
            ClientFrame::Message { .. } => "message",
        }
    }
}

/// Online/offline status carried by [`ServerFrame::Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl From<bool> for OnlineStatus {
    fn from(online: bool) -> Self {
        if online {
            OnlineStatus::Online
        } else {
            OnlineStatus::Offline
        }
    }
}

/// A frame sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A durably persisted chat message, fanned out to the whole room
    /// including the sender.
    Message {
        /// Persisted message id.
        message_id: i64,
        /// Message body.
        message: String,
        /// Sender user id.
        sender_id: i64,
        /// Sender display name.
        sender_name: String,
        /// Server-assigned timestamp, formatted `HH:MM`.
        timestamp: String,
        /// Read flag, always `false` at fan-out time.
        is_read: bool,
    },

    /// Typing indicator from another room member.
    Typing { user_id: i64, is_typing: bool },

    /// Online/offline transition for a user.
    Status {
        user_id: i64,
        status: OnlineStatus,
    },
}

impl ServerFrame {
    /// Get the frame kind as a static label (for logging).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Message { .. } => "message",
            ServerFrame::Typing { .. } => "typing",
            ServerFrame::Status { .. } => "status",
        }
    }

    /// Create a new Typing frame.
    #[must_use]
    pub fn typing(user_id: i64, is_typing: bool) -> Self {
        ServerFrame::Typing { user_id, is_typing }
    }

    /// Create a new Status frame.
    #[must_use]
    pub fn status(user_id: i64, online: bool) -> Self {
        ServerFrame::Status {
            user_id,
            status: online.into(),
        }
    }
}
