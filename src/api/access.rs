//! Access middleware for protected routes.
//!
//! Runs the access verifier once and attaches the resulting [`Principal`] as a
//! request extension; handlers take it from there and never look at the
//! `Authorization` header again.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::session::{error::AuthError, service::SessionService, Principal};

/// Raw token from `Authorization: Bearer <token>`.
///
/// # Errors
/// Returns an authentication error when the header is absent or not a bearer token.
pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::authentication("missing authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::authentication("invalid authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::authentication("invalid authorization header"));
    }
    Ok(token.trim().to_string())
}

pub async fn require_access(
    State(service): State<Arc<SessionService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal: Principal = match bearer_token(request.headers()) {
        Ok(token) => match service.authorize(&token).await {
            Ok(principal) => principal,
            Err(err) => return err.into_response(),
        },
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}
