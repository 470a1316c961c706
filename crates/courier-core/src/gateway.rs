//! Persistence gateway seam.
//!
//! The core never talks to a database directly; it calls this trait.
//! Message durability is a precondition for fan-out: a chat event is
//! built from the record the gateway returns, never speculatively.

use async_trait::async_trait;
use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A durable write or read failed. The triggering operation aborts;
    /// nothing derived from it is broadcast.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Referenced user does not exist.
    #[error("Unknown user: {0}")]
    UnknownUser(i64),

    /// Message content was empty after trimming.
    #[error("Empty message content")]
    EmptyContent,
}

/// The durable record handed back for a newly persisted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Assigned message id.
    pub id: i64,
    /// Server-assigned unix timestamp (seconds).
    pub timestamp: i64,
}

/// Durable store for users and messages, as seen by the core.
///
/// Implementations provide their own concurrency safety for concurrent
/// writes to distinct rows. No operation is retried here; failures
/// surface to the caller.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Persist a message and return its assigned id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is empty after trimming, a
    /// referenced user is unknown, or the write fails.
    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<NewMessage, GatewayError>;

    /// Update a user's durable online flag and last-seen timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_online_status(&self, user_id: i64, online: bool) -> Result<(), GatewayError>;
}
