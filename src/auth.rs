//! # Authentication
//!
//! Operator bearer authentication for the transport-bridge endpoints and
//! mutating API routes. With no tokens configured (dev and test
//! profiles) the extractor is a no-op; otherwise the presented token must
//! match one of the configured tokens under constant-time comparison.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::server::AppState;

/// Marker type for authenticated operator requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.operator_tokens.is_empty() {
            return Ok(OperatorAuth);
        }

        let token = extract_bearer_token(&parts.headers)?;
        validate_token(&state.config, token)?;
        Ok(OperatorAuth)
    }
}

/// Pull the bearer token out of the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?;

    let value = header
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized(Some("Authorization header must be 'Bearer <token>'")))
}

/// Compare the presented token against every configured token in constant
/// time; the loop never exits early on a match.
fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let mut matched = false;
    for expected in &config.operator_tokens {
        matched |= bool::from(token.as_bytes().ct_eq(expected.as_bytes()));
    }

    if matched {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid operator token")))
    }
}
