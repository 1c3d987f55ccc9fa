use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ErrorResponse, HookState};

/// Claims carried by a hook token
#[derive(Debug, Serialize, Deserialize)]
pub struct HookClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Sign a token for `subject` valid for `ttl_hours`
pub fn mint_token(secret: &str, subject: &str, ttl_hours: i64) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = HookClaims {
        sub: subject.to_string(),
        exp: (now + chrono::Duration::hours(ttl_hours)).timestamp().max(0) as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("token generation error: {}", e))
}

/// Extractor that validates the `Authorization: Bearer` hook token.
///
/// Add `_auth: HookAuth` to a handler's parameters to require it.
pub struct HookAuth {
    pub claims: HookClaims,
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<HookState>> for HookAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<HookState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = header.strip_prefix("Bearer ").ok_or(AuthError::InvalidToken)?;

        let token_data = jsonwebtoken::decode::<HookClaims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(state.jwt_secret.as_bytes()),
            &jsonwebtoken::Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(HookAuth { claims: token_data.claims })
    }
}

pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authentication token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
