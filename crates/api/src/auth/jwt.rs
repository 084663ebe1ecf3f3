//! JWT verification for bearer tokens and panel session cookies
//!
//! Token issuance lives in the platform's identity service; this module only
//! verifies. Bearer tokens and panel session cookies are signed with
//! different secrets but share the same claims shape.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use fleetdesk_shared::ActorKind;

use super::AuthError;

/// Claims shared by bearer tokens and panel session tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (business, admin, or courier ID)
    pub sub: Uuid,
    /// Actor kind. The only source of truth for caller classification.
    pub act: ActorKind,
    /// Display name, used for message attribution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Verifies tokens against the platform's signing secrets
#[derive(Clone)]
pub struct JwtManager {
    bearer_encoding_key: EncodingKey,
    bearer_decoding_key: DecodingKey,
    session_encoding_key: EncodingKey,
    session_decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl JwtManager {
    pub fn new(jwt_secret: &str, session_secret: &str, leeway_secs: u64) -> Self {
        Self {
            bearer_encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            bearer_decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            session_encoding_key: EncodingKey::from_secret(session_secret.as_bytes()),
            session_decoding_key: DecodingKey::from_secret(session_secret.as_bytes()),
            leeway_secs,
        }
    }

    /// Verify a bearer token (mobile/API callers)
    pub fn verify_bearer(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, &self.bearer_decoding_key)
    }

    /// Verify a panel session cookie (web panel callers)
    pub fn verify_session(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify(token, &self.session_decoding_key)
    }

    fn verify(&self, token: &str, key: &DecodingKey) -> Result<Claims, AuthError> {
        // Explicit algorithm prevents algorithm confusion attacks
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })
    }

    /// Sign a bearer token. Used by provisioning tooling and tests; the
    /// production issuance path lives in the identity service.
    pub fn sign_bearer(
        &self,
        sub: Uuid,
        act: ActorKind,
        name: Option<String>,
        expiry: Duration,
    ) -> Result<String, AuthError> {
        self.sign(sub, act, name, expiry, &self.bearer_encoding_key)
    }

    /// Sign a panel session token.
    pub fn sign_session(
        &self,
        sub: Uuid,
        act: ActorKind,
        name: Option<String>,
        expiry: Duration,
    ) -> Result<String, AuthError> {
        self.sign(sub, act, name, expiry, &self.session_encoding_key)
    }

    fn sign(
        &self,
        sub: Uuid,
        act: ActorKind,
        name: Option<String>,
        expiry: Duration,
        key: &EncodingKey,
    ) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub,
            act,
            name,
            iat: now.unix_timestamp(),
            exp: (now + expiry).unix_timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new(
            "test-jwt-secret-at-least-32-characters!!",
            "test-session-secret-at-least-32-chars!!!",
            60,
        )
    }

    #[test]
    fn test_bearer_round_trip_carries_actor_kind() {
        let jwt = manager();
        let id = Uuid::new_v4();
        let token = jwt
            .sign_bearer(id, ActorKind::Courier, Some("Dax".into()), Duration::hours(1))
            .unwrap();

        let claims = jwt.verify_bearer(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.act, ActorKind::Courier);
        assert_eq!(claims.name.as_deref(), Some("Dax"));
    }

    #[test]
    fn test_bearer_token_rejected_by_session_strategy() {
        // Different secrets: a bearer token must not verify as a session.
        let jwt = manager();
        let token = jwt
            .sign_bearer(Uuid::new_v4(), ActorKind::Admin, None, Duration::hours(1))
            .unwrap();

        assert_eq!(jwt.verify_session(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_expired_token() {
        let jwt = JwtManager::new(
            "test-jwt-secret-at-least-32-characters!!",
            "test-session-secret-at-least-32-chars!!!",
            0,
        );
        let token = jwt
            .sign_bearer(Uuid::new_v4(), ActorKind::Business, None, Duration::hours(-2))
            .unwrap();

        assert_eq!(jwt.verify_bearer(&token), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn test_garbage_token() {
        let jwt = manager();
        assert_eq!(jwt.verify_bearer("not-a-jwt"), Err(AuthError::InvalidToken));
    }
}
