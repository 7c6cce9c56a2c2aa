//! services/api/src/tokens.rs
//!
//! Signs and verifies the compact tokens that carry a session: short-lived
//! access tokens and longer-lived refresh tokens, each under its own signing
//! key so one domain can never verify the other's tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Claims carried by every issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Issued at (Unix timestamp, seconds).
    pub iat: i64,
    /// Expiry (Unix timestamp, seconds).
    pub exp: i64,
    /// Unique token id, so two tokens minted for the same user in the same
    /// second still hash differently.
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// HS256 codec over two independent key domains.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn sign_access(&self, user_id: i64) -> Result<String, jsonwebtoken::errors::Error> {
        sign(&self.access_encoding, user_id, self.access_ttl.as_secs() as i64)
    }

    pub fn sign_refresh(&self, user_id: i64) -> Result<String, jsonwebtoken::errors::Error> {
        sign(
            &self.refresh_encoding,
            user_id,
            self.refresh_ttl.as_secs() as i64,
        )
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        verify(&self.access_decoding, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        verify(&self.refresh_decoding, token)
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}

fn sign(
    key: &EncodingKey,
    user_id: i64,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + ttl_secs,
        jti: Uuid::new_v4().to_string(),
    };
    encode(&Header::default(), &claims, key)
}

fn verify(key: &DecodingKey, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // An expired token is expired; no grace window.
    validation.leeway = 0;
    decode::<Claims>(token, key, &validation).map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            "access-secret",
            "refresh-secret",
            Duration::from_secs(900),
            Duration::from_secs(7 * 24 * 60 * 60),
        )
    }

    #[test]
    fn access_tokens_round_trip() {
        let codec = codec();
        let token = codec.sign_access(42).unwrap();
        let claims = codec.verify_access(&token).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn key_domains_are_independent() {
        let codec = codec();
        let access = codec.sign_access(42).unwrap();
        let refresh = codec.sign_refresh(42).unwrap();
        assert!(codec.verify_refresh(&access).is_err());
        assert!(codec.verify_access(&refresh).is_err());
    }

    #[test]
    fn every_issued_token_is_unique() {
        let codec = codec();
        let a = codec.sign_refresh(7).unwrap();
        let b = codec.sign_refresh(7).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let codec = codec();
        let stale = sign(&codec.access_encoding, 42, -10).unwrap();
        let err = codec.verify_access(&stale).unwrap_err();
        assert_eq!(
            err.kind(),
            &jsonwebtoken::errors::ErrorKind::ExpiredSignature
        );
    }

    #[test]
    fn forged_signatures_are_rejected() {
        let codec = codec();
        let other = TokenCodec::new(
            "different-secret",
            "refresh-secret",
            Duration::from_secs(900),
            Duration::from_secs(900),
        );
        let forged = other.sign_access(42).unwrap();
        assert!(codec.verify_access(&forged).is_err());
    }
}
