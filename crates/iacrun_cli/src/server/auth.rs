//! Optional bearer-token gate for the run endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::errors::ApiError;
use super::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Reject requests without the configured bearer token.
///
/// Passes everything through when no token is configured.
pub(crate) async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

    if !tokens_match(presented.as_bytes(), expected.as_bytes()) {
        warn!(path = %req.uri().path(), "rejected request with bad token");
        return Err(ApiError::forbidden("bad token"));
    }

    Ok(next.run(req).await)
}

/// Comparison whose running time does not depend on where the inputs differ.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
