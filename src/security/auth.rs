//! Bearer-token verification.
//!
//! Tokens are HS256 JWTs signed with a shared secret by the identity
//! service. `issue_token` exists for local development and tests.

use crate::error::{AppError, Result};
use crate::security::policy::UserContext;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))
    }
}

/// Looks up the account behind a verified token.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Active user with this id, or `None` when unknown or deactivated.
    async fn find_active(&self, id: Uuid) -> Result<Option<UserContext>>;
}

pub fn issue_token(secret: &str, user_id: Uuid, email: Option<String>, ttl: Duration) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        email,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Config(format!("Failed to sign token: {}", e)))
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed Authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected Bearer token".to_string()))?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-0123456789";

    #[test]
    fn test_issue_and_verify() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, Some("x@example.com".into()), Duration::hours(1)).unwrap();
        let claims = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email.as_deref(), Some("x@example.com"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), None, Duration::hours(-2)).unwrap();
        let err = TokenVerifier::new(SECRET).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), None, Duration::hours(1)).unwrap();
        assert!(TokenVerifier::new("another-secret-987654321").verify(&token).is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
