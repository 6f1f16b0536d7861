use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::JwtConfig;

/// Caller identity, taken from an HS256 bearer token issued by the identity
/// provider. Handlers receive it as an explicit argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    // User id as a decimal string
    pub sub: String,
    pub exp: u64,
}

pub fn verify_token(token: &str, config: &JwtConfig) -> Result<AuthUser, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.leeway = config.leeway_seconds;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(config.secret.as_bytes()), &validation)?;
    let user_id = data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| jsonwebtoken::errors::ErrorKind::InvalidSubject)?;
    Ok(AuthUser { user_id })
}

impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<crate::AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        verify_token(token.trim(), &state.config.jwt).map_err(|e| {
            tracing::debug!("rejected bearer token: {}", e);
            StatusCode::UNAUTHORIZED
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn config() -> JwtConfig {
        JwtConfig { secret: "test-secret".into(), leeway_seconds: 0 }
    }

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as u64;
        encode(
            &Header::default(),
            &Claims { sub: sub.into(), exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_user() {
        let user = verify_token(&token("42", 600, "test-secret"), &config()).unwrap();
        assert_eq!(user, AuthUser { user_id: 42 });
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        assert!(verify_token(&token("42", -600, "test-secret"), &config()).is_err());
        assert!(verify_token(&token("42", 600, "other-secret"), &config()).is_err());
        assert!(verify_token("not-a-jwt", &config()).is_err());
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        assert!(verify_token(&token("alice", 600, "test-secret"), &config()).is_err());
    }
}
