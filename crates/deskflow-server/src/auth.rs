//! Credential issuance and verification, password hashing, and the bearer
//! middleware that turns an `Authorization` header into a [`Caller`].

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Duration;
use deskflow_shared::credential::{issue_credential, verify_credential, Claims, TokenKind};
use deskflow_shared::{Caller, Clock, Role};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuthFailure, ServiceError};

// ---------------------------------------------------------------------------
// Token pair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Signs and checks the server's bearer credentials.
#[derive(Clone)]
pub struct Authenticator {
    signing_key: Arc<SigningKey>,
    verifying_key: VerifyingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(
        signing_key: SigningKey,
        access_ttl: std::time::Duration,
        refresh_ttl: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key: Arc::new(signing_key),
            verifying_key,
            access_ttl: Duration::from_std(access_ttl).unwrap_or(Duration::hours(1)),
            refresh_ttl: Duration::from_std(refresh_ttl).unwrap_or(Duration::hours(3)),
            clock,
        }
    }

    /// Fresh access and refresh credentials for `user_id`.
    pub fn issue_pair(&self, user_id: i64, role: Role) -> Result<TokenPair, ServiceError> {
        let now = self.clock.now();
        let access = Claims {
            user_id,
            role,
            kind: TokenKind::Access,
            expires_at: now + self.access_ttl,
        };
        let refresh = Claims {
            kind: TokenKind::Refresh,
            expires_at: now + self.refresh_ttl,
            ..access.clone()
        };

        Ok(TokenPair {
            access_token: issue_credential(&access, &self.signing_key)?,
            refresh_token: issue_credential(&refresh, &self.signing_key)?,
        })
    }

    /// Verify `token` and require it to be of `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, ServiceError> {
        let claims = verify_credential(token, &self.verifying_key, self.clock.now())?;
        if claims.kind != kind {
            debug!(user_id = claims.user_id, ?kind, "credential of the wrong kind");
            return Err(ServiceError::Unauthorized(AuthFailure::InvalidToken));
        }
        Ok(claims)
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

/// Salted Argon2id hash in PHC string form.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {e}")))
}

/// `false` on mismatch; an unparsable stored hash is an internal error.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ServiceError::Internal(format!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_blocking(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(
    password: String,
    stored_hash: String,
) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await?
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Require a valid access credential and attach its [`Caller`] to the
/// request extensions.
pub async fn require_auth(
    State(auth): State<Authenticator>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = bearer_token(&req).ok_or(ServiceError::Unauthorized(AuthFailure::MissingToken))?;

    let claims = auth.verify(token, TokenKind::Access).map_err(|e| {
        warn!(path = %req.uri().path(), error = %e, "Rejected credential");
        e
    })?;

    req.extensions_mut().insert(claims.caller());
    Ok(next.run(req).await)
}

/// Layered after [`require_auth`]: only admins get through.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ServiceError> {
    match req.extensions().get::<Caller>() {
        Some(caller) if caller.role.is_admin() => Ok(next.run(req).await),
        Some(caller) => {
            warn!(user_id = caller.user_id, path = %req.uri().path(), "Admin route refused");
            Err(ServiceError::Forbidden("admin role required".into()))
        }
        None => Err(ServiceError::Unauthorized(AuthFailure::MissingToken)),
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use deskflow_shared::FixedClock;

    fn authenticator(clock: Arc<FixedClock>) -> Authenticator {
        Authenticator::new(
            SigningKey::from_bytes(&[9u8; 32]),
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_secs(3 * 3600),
            clock,
        )
    }

    #[test]
    fn test_pair_kinds_are_enforced() {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap()));
        let auth = authenticator(clock);
        let pair = auth.issue_pair(4, Role::Management).unwrap();

        let access = auth.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.caller(), Caller { user_id: 4, role: Role::Management });

        assert!(matches!(
            auth.verify(&pair.refresh_token, TokenKind::Access),
            Err(ServiceError::Unauthorized(AuthFailure::InvalidToken))
        ));
        assert!(auth.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_access_expires_before_refresh() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let auth = authenticator(clock.clone());
        let pair = auth.issue_pair(1, Role::Standard).unwrap();

        clock.set(start + Duration::hours(2));
        assert!(matches!(
            auth.verify(&pair.access_token, TokenKind::Access),
            Err(ServiceError::Unauthorized(AuthFailure::TokenExpired))
        ));
        assert!(auth.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn test_password_hash_round() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash).unwrap());
        assert!(!verify_password("guess", &hash).unwrap());
        assert!(verify_password("s3cret", "not-a-hash").is_err());
    }
}
