//! Message rows: durable writes, conversation replay, unread counts.
//!
//! Timestamps are server-assigned at persistence time. Deletion is soft:
//! deleted rows drop out of replay and unread counts but are never
//! physically removed.

use crate::{SqliteStore, StoreError};
use tracing::debug;

/// A persisted message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    /// Server-assigned unix timestamp (seconds).
    pub created_at: i64,
    pub is_read: bool,
    pub is_deleted: bool,
}

type MessageRow = (i64, i64, i64, String, i64, bool, bool);

impl StoredMessage {
    fn from_row(
        (id, sender_id, receiver_id, content, created_at, is_read, is_deleted): MessageRow,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            content,
            created_at,
            is_read,
            is_deleted,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, created_at, is_read, is_deleted";

impl SqliteStore {
    /// Persist a message with a server-assigned timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is empty after trimming, the
    /// receiver is unknown, or the write fails.
    pub async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        if self.user_by_id(receiver_id).await?.is_none() {
            return Err(StoreError::UnknownUser(receiver_id));
        }

        let created_at = Self::now_unix();
        let result = sqlx::query(
            "INSERT INTO messages (sender_id, receiver_id, content, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(content)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(message_id = id, sender_id, receiver_id, "Persisted message");

        Ok(StoredMessage {
            id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at,
            is_read: false,
            is_deleted: false,
        })
    }

    /// Fetch the conversation between two users, both directions,
    /// excluding soft-deleted rows, ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn conversation(&self, a: i64, b: i64) -> Result<Vec<StoredMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE ((sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?)) \
               AND is_deleted=0 \
             ORDER BY created_at, id",
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredMessage::from_row).collect())
    }

    /// Mark every message from `sender_id` to `receiver_id` as read.
    ///
    /// Returns the number of rows flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn mark_read(&self, sender_id: i64, receiver_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read=1 WHERE sender_id=? AND receiver_id=? AND is_read=0",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soft-delete a message. Only the sender may delete their own
    /// message; the row stays in place with its deleted flag set.
    ///
    /// Returns `true` if a row was flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn soft_delete(&self, message_id: i64, sender_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE messages SET is_deleted=1 WHERE id=? AND sender_id=?")
            .bind(message_id)
            .bind(sender_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count unread, undeleted messages from `sender_id` to
    /// `receiver_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn unread_count(&self, sender_id: i64, receiver_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages \
             WHERE sender_id=? AND receiver_id=? AND is_read=0 AND is_deleted=0",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Per-sender unread counts for a receiver, for senders with at
    /// least one unread message.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn unread_counts(&self, receiver_id: i64) -> Result<Vec<(i64, i64)>, StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT sender_id, COUNT(*) FROM messages \
             WHERE receiver_id=? AND is_read=0 AND is_deleted=0 \
             GROUP BY sender_id ORDER BY sender_id",
        )
        .bind(receiver_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> (SqliteStore, i64, i64) {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = store.create_user("alice").await.unwrap();
        let bob = store.create_user("bob").await.unwrap();
        (store, alice.id, bob.id)
    }

    #[tokio::test]
    async fn test_create_message_assigns_id_and_timestamp() {
        let (store, alice, bob) = seeded_store().await;

        let msg = store.create_message(alice, bob, "  hi there  ").await.unwrap();
        assert!(msg.id > 0);
        assert!(msg.created_at > 0);
        assert_eq!(msg.content, "hi there"); // trimmed before storage
        assert!(!msg.is_read);
        assert!(!msg.is_deleted);
    }

    #[tokio::test]
    async fn test_create_message_rejects_whitespace() {
        let (store, alice, bob) = seeded_store().await;

        assert!(matches!(
            store.create_message(alice, bob, "   ").await,
            Err(StoreError::EmptyContent)
        ));
        assert_eq!(store.conversation(alice, bob).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_create_message_unknown_receiver() {
        let (store, alice, _) = seeded_store().await;

        assert!(matches!(
            store.create_message(alice, 99, "hi").await,
            Err(StoreError::UnknownUser(99))
        ));
    }

    #[tokio::test]
    async fn test_conversation_both_directions_ordered() {
        let (store, alice, bob) = seeded_store().await;

        let m1 = store.create_message(alice, bob, "one").await.unwrap();
        let m2 = store.create_message(bob, alice, "two").await.unwrap();
        let m3 = store.create_message(alice, bob, "three").await.unwrap();

        let convo = store.conversation(alice, bob).await.unwrap();
        assert_eq!(
            convo.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id, m3.id]
        );
        // Symmetric regardless of argument order.
        assert_eq!(store.conversation(bob, alice).await.unwrap(), convo);
    }

    #[tokio::test]
    async fn test_soft_delete_excludes_from_replay_and_counts() {
        let (store, alice, bob) = seeded_store().await;

        let msg = store.create_message(alice, bob, "oops").await.unwrap();
        store.create_message(alice, bob, "keep").await.unwrap();
        assert_eq!(store.unread_count(alice, bob).await.unwrap(), 2);

        // Only the sender may delete.
        assert!(!store.soft_delete(msg.id, bob).await.unwrap());
        assert!(store.soft_delete(msg.id, alice).await.unwrap());

        let convo = store.conversation(alice, bob).await.unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].content, "keep");
        assert_eq!(store.unread_count(alice, bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_zeroes_unread_count() {
        let (store, alice, bob) = seeded_store().await;

        store.create_message(alice, bob, "one").await.unwrap();
        store.create_message(alice, bob, "two").await.unwrap();
        assert_eq!(store.unread_count(alice, bob).await.unwrap(), 2);

        assert_eq!(store.mark_read(alice, bob).await.unwrap(), 2);
        assert_eq!(store.unread_count(alice, bob).await.unwrap(), 0);
        // Idempotent.
        assert_eq!(store.mark_read(alice, bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unread_counts_grouped_by_sender() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = store.create_user("alice").await.unwrap().id;
        let bob = store.create_user("bob").await.unwrap().id;
        let carol = store.create_user("carol").await.unwrap().id;

        store.create_message(alice, carol, "a1").await.unwrap();
        store.create_message(alice, carol, "a2").await.unwrap();
        store.create_message(bob, carol, "b1").await.unwrap();

        let counts = store.unread_counts(carol).await.unwrap();
        assert_eq!(counts, vec![(alice, 2), (bob, 1)]);
    }
}
