use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use crate::{error::BookingError, AppState};

/// Header set by the upstream auth gateway once the client is authenticated.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Authenticated client, taken from `X-Client-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientId(pub i64);

impl<S> FromRequestParts<S> for ClientId
where
    S: Send + Sync,
{
    type Rejection = BookingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(ClientId)
            .ok_or_else(|| BookingError::Unauthorized("Missing or invalid client id".into()))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim)
}

/// Constant-time comparison: both tokens are MACed under `expected` and the
/// tags compared with `verify_slice`.
fn tokens_match(given: &str, expected: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(expected.as_bytes());
    let tag = mac.finalize().into_bytes();

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(given.as_bytes());
    mac.verify_slice(&tag).is_ok()
}

/// Axum middleware guarding staff routes with the shared staff token.
pub async fn require_staff(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.staff_api_token.is_empty() {
        tracing::warn!("Staff request rejected: STAFF_API_TOKEN not configured");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !tokens_match(token, &state.staff_api_token) {
        tracing::warn!("Staff token mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}
