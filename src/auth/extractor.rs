//! Bearer token extractor

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// The caller identified by a valid session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("No token, authorization denied".to_string()))?;

        let claims = state.tokens().verify(token)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}
