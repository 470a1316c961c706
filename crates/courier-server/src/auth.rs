//! Handshake identity resolution.
//!
//! Authentication itself (registration, credentials, token issuance) is
//! an external collaborator; the server only resolves a pre-established
//! token to a user identity at handshake time. A connection without a
//! valid identity is closed before any frame is sent.

use async_trait::async_trait;
use courier_store::SqliteStore;
use tracing::{debug, warn};

/// The authenticated identity bound to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
}

/// Resolves handshake credentials to a user identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a token to an identity; `None` rejects the handshake.
    async fn authenticate(&self, token: Option<&str>) -> Option<UserIdentity>;
}

/// Authenticator backed by the store's `auth_tokens` table, which the
/// external auth collaborator maintains.
pub struct StoreAuthenticator {
    store: SqliteStore,
}

impl StoreAuthenticator {
    /// Create a new store-backed authenticator.
    #[must_use]
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Authenticator for StoreAuthenticator {
    async fn authenticate(&self, token: Option<&str>) -> Option<UserIdentity> {
        let token = token?;

        match self.store.user_by_token(token).await {
            Ok(Some(user)) => {
                debug!(user_id = user.id, "Authenticated handshake");
                Some(UserIdentity {
                    id: user.id,
                    username: user.username,
                })
            }
            Ok(None) => {
                debug!("Rejected handshake: unknown token");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token lookup failed; rejecting handshake");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_token_resolves_identity() {
        let store = SqliteStore::in_memory().await.unwrap();
        let alice = store.create_user("alice").await.unwrap();
        store.register_token("tok-alice", alice.id).await.unwrap();

        let auth = StoreAuthenticator::new(store);
        let identity = auth.authenticate(Some("tok-alice")).await.unwrap();
        assert_eq!(identity.id, alice.id);
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_missing_or_unknown_token_rejects() {
        let store = SqliteStore::in_memory().await.unwrap();
        let auth = StoreAuthenticator::new(store);

        assert!(auth.authenticate(None).await.is_none());
        assert!(auth.authenticate(Some("tok-nobody")).await.is_none());
    }
}
