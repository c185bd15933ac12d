//! Shared-secret checks for `/send` (bearer header) and `/qr` (bearer header or `?token=`).

use crate::gateway::error::GatewayError;
use axum::http::{header, HeaderMap};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// When `expected` is set, the bearer token must match it exactly.
pub fn require_bearer(expected: Option<&str>, headers: &HeaderMap) -> Result<(), GatewayError> {
    match expected {
        Some(expected) if bearer_token(headers) != Some(expected) => Err(GatewayError::Unauthorized),
        _ => Ok(()),
    }
}

/// When `expected` is set, either the query token or the bearer token must match it.
pub fn require_query_or_bearer(
    expected: Option<&str>,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), GatewayError> {
    match expected {
        Some(expected)
            if query_token != Some(expected) && bearer_token(headers) != Some(expected) =>
        {
            Err(GatewayError::Unauthorized)
        }
        _ => Ok(()),
    }
}
