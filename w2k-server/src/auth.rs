//! Bearer token check for mutating routes

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

/// Extractor that succeeds when the request carries the configured token,
/// or when no token is configured
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

#[async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_token.as_deref() else {
            return Ok(Authorized);
        };

        let presented = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;

        if tokens_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(Authorized)
        } else {
            tracing::warn!("Rejected request with invalid API token");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Compare without short-circuiting on the first differing byte
fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
