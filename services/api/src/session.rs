//! services/api/src/session.rs
//!
//! The session lifecycle: login, rotating refresh, revocation, and the
//! inbound access-token guard. Refresh tokens are never persisted in
//! plaintext; only a SHA-256 digest of the single currently-trusted token is
//! stored per user, and every refresh rotates it. A presented token whose
//! signature verifies but whose digest no longer matches the stored one is
//! treated as reuse of a stolen token: the stored digest is cleared, forcing
//! a fresh login.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, warn};

use crate::tokens::TokenCodec;
use questlog_core::domain::Principal;
use questlog_core::ports::Store;

/// Authentication and token lifecycle failures.
///
/// `InvalidCredentials` is returned for unknown email and bad password
/// alike; the two cases must stay indistinguishable to a client.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no token provided")]
    NoToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("refresh token reuse detected")]
    TokenReuseDetected,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal auth error: {0}")]
    Internal(String),
}

/// A freshly minted token pair. The refresh token leaves the server exactly
/// once, in the Set-Cookie header; only its digest is retained.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// One-way digest of a refresh token, hex encoded. This is the only form in
/// which refresh tokens ever touch the store.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Orchestrates login, refresh rotation, logout and the access-token guard
/// over the store port and token codec, both injected at construction.
pub struct SessionManager {
    store: Arc<dyn Store>,
    codec: TokenCodec,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    pub fn refresh_ttl(&self) -> std::time::Duration {
        self.codec.refresh_ttl()
    }

    /// Verifies credentials and issues a fresh token pair, overwriting the
    /// stored refresh digest. Logging in invalidates any other outstanding
    /// refresh token for the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let creds = self
            .store
            .credentials_by_email(email)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&creds.password_hash)
            .map_err(|e| AuthError::Internal(format!("stored hash is malformed: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let tokens = self.issue(creds.user_id)?;
        self.store
            .store_refresh_hash(creds.user_id, &token_digest(&tokens.refresh_token))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(tokens)
    }

    /// Exchanges a presented refresh token for a new pair, rotating the
    /// stored digest. Single-use: the presented token is permanently invalid
    /// afterwards. A valid signature whose digest no longer matches means
    /// the token was already rotated or revoked; the stored digest is
    /// cleared and the caller gets `TokenReuseDetected`.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedTokens, AuthError> {
        let claims = self
            .codec
            .verify_refresh(presented)
            .map_err(|_| AuthError::InvalidToken)?;
        let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;

        let tokens = self.issue(user_id)?;
        let rotated = self
            .store
            .rotate_refresh_hash(
                user_id,
                &token_digest(presented),
                &token_digest(&tokens.refresh_token),
            )
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if !rotated {
            // Possible theft. Revoke the whole session rather than just
            // rejecting this call.
            warn!(user_id, "refresh token reuse detected, revoking session");
            if let Err(e) = self.store.clear_refresh_hash(user_id).await {
                error!(user_id, "failed to revoke session after reuse: {e}");
            }
            return Err(AuthError::TokenReuseDetected);
        }
        Ok(tokens)
    }

    /// Best-effort server-side revoke of whichever session holds the
    /// presented token. Failures are logged; the HTTP layer clears the
    /// client cookie regardless.
    pub async fn logout(&self, presented: &str) {
        if let Err(e) = self
            .store
            .clear_refresh_hash_by_value(&token_digest(presented))
            .await
        {
            error!("failed to revoke refresh token on logout: {e}");
        }
    }

    /// Inbound guard for protected operations: resolves an access token to
    /// its principal. Missing, malformed, expired and forged tokens all
    /// collapse to `Unauthorized`.
    pub fn authenticate(&self, access_token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .codec
            .verify_access(access_token)
            .map_err(|_| AuthError::Unauthorized)?;
        let user_id = claims.user_id().ok_or(AuthError::Unauthorized)?;
        Ok(Principal { user_id })
    }

    fn issue(&self, user_id: i64) -> Result<IssuedTokens, AuthError> {
        let access_token = self
            .codec
            .sign_access(user_id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let refresh_token = self
            .codec
            .sign_refresh(user_id)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use async_trait::async_trait;
    use questlog_core::domain::{
        CompletionOutcome, LeaderboardEntry, NewTask, Task, User, UserCredentials, UserStats,
    };
    use questlog_core::ports::{PortError, PortResult};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory refresh registry + credential table. Task and leaderboard
    /// methods are unreachable from the session manager.
    #[derive(Default)]
    struct MemoryStore {
        creds: Mutex<HashMap<String, UserCredentials>>,
        hashes: Mutex<HashMap<i64, String>>,
    }

    impl MemoryStore {
        fn with_user(user_id: i64, email: &str, password: &str) -> Self {
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .unwrap()
                .to_string();
            let store = Self::default();
            store.creds.lock().unwrap().insert(
                email.to_string(),
                UserCredentials {
                    user_id,
                    email: email.to_string(),
                    password_hash,
                },
            );
            store
        }

        fn stored_hash(&self, user_id: i64) -> Option<String> {
            self.hashes.lock().unwrap().get(&user_id).cloned()
        }
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn create_user(
            &self,
            _name: &str,
            _email: &str,
            _password_hash: &str,
        ) -> PortResult<User> {
            unreachable!("not exercised by the session manager")
        }

        async fn credentials_by_email(&self, email: &str) -> PortResult<Option<UserCredentials>> {
            Ok(self.creds.lock().unwrap().get(email).cloned())
        }

        async fn store_refresh_hash(&self, user_id: i64, hash: &str) -> PortResult<()> {
            self.hashes
                .lock()
                .unwrap()
                .insert(user_id, hash.to_string());
            Ok(())
        }

        async fn rotate_refresh_hash(
            &self,
            user_id: i64,
            expected: &str,
            next: &str,
        ) -> PortResult<bool> {
            let mut hashes = self.hashes.lock().unwrap();
            match hashes.get(&user_id) {
                Some(current) if current == expected => {
                    hashes.insert(user_id, next.to_string());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn clear_refresh_hash(&self, user_id: i64) -> PortResult<()> {
            self.hashes.lock().unwrap().remove(&user_id);
            Ok(())
        }

        async fn clear_refresh_hash_by_value(&self, hash: &str) -> PortResult<()> {
            self.hashes.lock().unwrap().retain(|_, v| v != hash);
            Ok(())
        }

        async fn create_task(&self, _task: NewTask) -> PortResult<Task> {
            Err(PortError::Unexpected("not implemented".into()))
        }

        async fn tasks_for_user(&self, _user_id: i64) -> PortResult<Vec<Task>> {
            Err(PortError::Unexpected("not implemented".into()))
        }

        async fn toggle_completion(
            &self,
            _task_id: i64,
            _user_id: i64,
        ) -> PortResult<CompletionOutcome> {
            Err(PortError::Unexpected("not implemented".into()))
        }

        async fn apply_xp_delta(&self, _user_id: i64, _delta: i64) -> PortResult<UserStats> {
            Err(PortError::Unexpected("not implemented".into()))
        }

        async fn leaderboard(&self, _limit: u32) -> PortResult<Vec<LeaderboardEntry>> {
            Err(PortError::Unexpected("not implemented".into()))
        }
    }

    fn manager(store: Arc<MemoryStore>) -> SessionManager {
        let codec = TokenCodec::new(
            "test-access-secret",
            "test-refresh-secret",
            Duration::from_secs(900),
            Duration::from_secs(7 * 24 * 60 * 60),
        );
        SessionManager::new(store, codec)
    }

    #[tokio::test]
    async fn login_stores_only_a_digest_of_the_refresh_token() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store.clone());

        let tokens = sessions.login("a@example.com", "hunter2").await.unwrap();
        let stored = store.stored_hash(1).unwrap();
        assert_eq!(stored, token_digest(&tokens.refresh_token));
        assert_ne!(stored, tokens.refresh_token);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store.clone());

        let bad_password = sessions.login("a@example.com", "wrong").await.unwrap_err();
        let unknown_email = sessions.login("b@example.com", "hunter2").await.unwrap_err();
        assert!(matches!(bad_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert!(store.stored_hash(1).is_none(), "no session was created");
    }

    #[tokio::test]
    async fn login_overwrites_the_previous_session() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store.clone());

        let first = sessions.login("a@example.com", "hunter2").await.unwrap();
        let second = sessions.login("a@example.com", "hunter2").await.unwrap();
        assert_eq!(
            store.stored_hash(1).unwrap(),
            token_digest(&second.refresh_token)
        );

        // The first session's refresh token is now someone else's digest.
        let err = sessions.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenReuseDetected));
    }

    #[tokio::test]
    async fn refresh_rotates_and_the_old_token_is_reuse() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store.clone());

        let original = sessions.login("a@example.com", "hunter2").await.unwrap();
        let rotated = sessions.refresh(&original.refresh_token).await.unwrap();
        assert_ne!(original.refresh_token, rotated.refresh_token);
        assert_eq!(
            store.stored_hash(1).unwrap(),
            token_digest(&rotated.refresh_token)
        );

        // Presenting the first token again is reuse and revokes the session
        // entirely.
        let err = sessions.refresh(&original.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenReuseDetected));
        assert!(store.stored_hash(1).is_none());

        // Even the legitimately rotated token is now useless.
        let err = sessions.refresh(&rotated.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenReuseDetected));
    }

    #[tokio::test]
    async fn garbage_refresh_tokens_are_invalid_not_reuse() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store);

        let err = sessions.refresh("not-a-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn an_access_token_cannot_be_used_as_a_refresh_token() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store);

        let tokens = sessions.login("a@example.com", "hunter2").await.unwrap();
        let err = sessions.refresh(&tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_revokes_the_stored_session() {
        let store = Arc::new(MemoryStore::with_user(1, "a@example.com", "hunter2"));
        let sessions = manager(store.clone());

        let tokens = sessions.login("a@example.com", "hunter2").await.unwrap();
        sessions.logout(&tokens.refresh_token).await;
        assert!(store.stored_hash(1).is_none());

        let err = sessions.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenReuseDetected));
    }

    #[tokio::test]
    async fn authenticate_resolves_the_principal() {
        let store = Arc::new(MemoryStore::with_user(7, "a@example.com", "hunter2"));
        let sessions = manager(store);

        let tokens = sessions.login("a@example.com", "hunter2").await.unwrap();
        let principal = sessions.authenticate(&tokens.access_token).unwrap();
        assert_eq!(principal.user_id, 7);

        assert!(matches!(
            sessions.authenticate("garbage").unwrap_err(),
            AuthError::Unauthorized
        ));
        // Refresh tokens are not valid at the access boundary.
        assert!(matches!(
            sessions.authenticate(&tokens.refresh_token).unwrap_err(),
            AuthError::Unauthorized
        ));
    }
}
