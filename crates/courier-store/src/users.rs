//! User rows and identity resolution.
//!
//! User accounts are owned by the external auth collaborator; the core
//! reads identity from `auth_tokens` at handshake time and writes only
//! the online flag and last-seen timestamp.

use crate::{SqliteStore, StoreError};

/// A user row, as referenced by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_online: bool,
    /// Unix timestamp (seconds) of the last status transition.
    pub last_seen: i64,
}

impl User {
    fn from_row((id, username, is_online, last_seen): (i64, String, bool, i64)) -> Self {
        Self {
            id,
            username,
            is_online,
            last_seen,
        }
    }
}

impl SqliteStore {
    /// Create a user. Seeding helper for development and tests; real
    /// registration lives in the external auth collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let result = sqlx::query("INSERT INTO users (username, last_seen) VALUES (?, ?)")
            .bind(username)
            .bind(Self::now_unix())
            .execute(&self.pool)
            .await?;

        let id = result.last_insert_rowid();
        self.user_by_id(id)
            .await?
            .ok_or(StoreError::UnknownUser(id))
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<(i64, String, bool, i64)> =
            sqlx::query_as("SELECT id, username, is_online, last_seen FROM users WHERE id=?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from_row))
    }

    /// Resolve a pre-established auth token to its user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let row: Option<(i64, String, bool, i64)> = sqlx::query_as(
            "SELECT u.id, u.username, u.is_online, u.last_seen \
             FROM users u JOIN auth_tokens t ON t.user_id = u.id \
             WHERE t.token=?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from_row))
    }

    /// Record a token issued by the external auth collaborator. Seeding
    /// helper for development and tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn register_token(&self, token: &str, user_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO auth_tokens (token, user_id) VALUES (?, ?)")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update a user's durable online flag and last-seen timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the write fails.
    pub async fn set_online(&self, user_id: i64, online: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_online=?, last_seen=? WHERE id=?")
            .bind(online)
            .bind(Self::now_unix())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUser(user_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_row() {
        let user = User::from_row((3, "carol".into(), true, 99));
        assert_eq!(user.id, 3);
        assert_eq!(user.username, "carol");
        assert!(user.is_online);
        assert_eq!(user.last_seen, 99);
    }

    #[tokio::test]
    async fn test_token_resolution() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = store.create_user("alice").await.unwrap();
        store.register_token("tok-alice", alice.id).await.unwrap();

        let resolved = store.user_by_token("tok-alice").await.unwrap().unwrap();
        assert_eq!(resolved.id, alice.id);
        assert_eq!(resolved.username, "alice");

        assert!(store.user_by_token("tok-unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_online_updates_flag_and_last_seen() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = store.create_user("alice").await.unwrap();
        assert!(!alice.is_online);

        store.set_online(alice.id, true).await.unwrap();
        let online = store.user_by_id(alice.id).await.unwrap().unwrap();
        assert!(online.is_online);
        assert!(online.last_seen >= alice.last_seen);

        store.set_online(alice.id, false).await.unwrap();
        let offline = store.user_by_id(alice.id).await.unwrap().unwrap();
        assert!(!offline.is_online);
    }

    #[tokio::test]
    async fn test_set_online_unknown_user() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(matches!(
            store.set_online(42, true).await,
            Err(StoreError::UnknownUser(42))
        ));
    }
}
