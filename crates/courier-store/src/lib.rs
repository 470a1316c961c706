//! # courier-store
//!
//! SQLite persistence gateway for Courier.
//!
//! Implements [`courier_core::Gateway`] on top of sqlx, plus the query
//! surface the external CRUD/view layer consumes directly (conversation
//! replay, unread counts, read flags, soft deletion).
//!
//! Schema migrations proper are owned by the deployment; this crate only
//! carries a `CREATE TABLE IF NOT EXISTS` bootstrap for development and
//! tests.

pub mod messages;
pub mod users;

use async_trait::async_trait;
use courier_core::gateway::{Gateway, GatewayError, NewMessage};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

pub use messages::StoredMessage;
pub use users::User;

/// Development/test schema bootstrap.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    username   TEXT NOT NULL,
    is_online  INTEGER NOT NULL DEFAULT 0,
    last_seen  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id   INTEGER NOT NULL REFERENCES users(id),
    receiver_id INTEGER NOT NULL REFERENCES users(id),
    content     TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    is_read     INTEGER NOT NULL DEFAULT 0,
    is_deleted  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    token   TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id)
);
"#;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced user does not exist.
    #[error("Unknown user: {0}")]
    UnknownUser(i64),

    /// Message content was empty after trimming.
    #[error("Empty message content")]
    EmptyContent,
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => GatewayError::Persistence(e.to_string()),
            StoreError::UnknownUser(id) => GatewayError::UnknownUser(id),
            StoreError::EmptyContent => GatewayError::EmptyContent,
        }
    }
}

/// SQLite-backed persistence gateway.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a SQLite database and apply the schema bootstrap.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or bootstrap fails.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!(url, "Connected to store");
        Ok(store)
    }

    /// Open an in-memory store. Used by tests and local development.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or bootstrap fails.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A single connection keeps every query on the same in-memory
        // database.
        Self::connect("sqlite::memory:", 1).await
    }

    /// Apply the development schema bootstrap.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn now_unix() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}

#[async_trait]
impl Gateway for SqliteStore {
    async fn create_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
    ) -> Result<NewMessage, GatewayError> {
        let message = SqliteStore::create_message(self, sender_id, receiver_id, content).await?;
        Ok(NewMessage {
            id: message.id,
            timestamp: message.created_at,
        })
    }

    async fn set_online_status(&self, user_id: i64, online: bool) -> Result<(), GatewayError> {
        SqliteStore::set_online(self, user_id, online).await?;
        Ok(())
    }
}
