//! Registration, password login and token refresh.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    api::{access::bearer_token, error::ErrorResponse},
    session::{
        error::AuthError,
        models::{LoginRequest, MessageResponse, RegisterRequest, TokenPair},
        service::SessionService,
    },
};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity created", body = MessageResponse),
        (status = 400, description = "Invalid name, email or password", body = ErrorResponse),
        (status = 409, description = "Email already exists", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(service, payload))]
pub async fn register(
    service: Extension<Arc<SessionService>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::validation("missing payload"));
    };
    let response = service
        .register(&request.name, &request.email, &request.password)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Wrong password", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(service, payload))]
pub async fn login(
    service: Extension<Arc<SessionService>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::validation("missing payload"));
    };
    let pair = service.login(&request.email, &request.password).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Session rotated", body = TokenPair),
        (status = 401, description = "Invalid, expired or superseded refresh token", body = ErrorResponse),
        (status = 404, description = "No session for this identity", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip(service, headers))]
pub async fn refresh(
    service: Extension<Arc<SessionService>>,
    headers: HeaderMap,
) -> Result<Json<TokenPair>, AuthError> {
    let token = bearer_token(&headers)?;
    let pair = service.refresh_presented(&token).await?;
    Ok(Json(pair))
}
