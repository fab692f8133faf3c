//! Endpoints behind the access middleware. Each one consumes the [`Principal`]
//! the middleware attached.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::instrument;

use crate::{
    api::error::ErrorResponse,
    session::{
        error::AuthError,
        models::{MessageResponse, ProfileResponse},
        service::SessionService,
        Principal,
    },
};

#[utoipa::path(
    post,
    path = "/user/logout",
    responses(
        (status = 200, description = "Session deleted and access token revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "user"
)]
#[instrument(skip(service, principal), fields(identity_id = %principal.identity_id))]
pub async fn logout(
    service: Extension<Arc<SessionService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MessageResponse>, AuthError> {
    Ok(Json(service.logout(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/user/profile",
    responses(
        (status = 200, description = "Profile of the authenticated identity", body = ProfileResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorResponse),
        (status = 404, description = "Identity no longer exists", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "user"
)]
#[instrument(skip(service, principal), fields(identity_id = %principal.identity_id))]
pub async fn profile(
    service: Extension<Arc<SessionService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ProfileResponse>, AuthError> {
    Ok(Json(service.profile(principal.identity_id).await?))
}

#[utoipa::path(
    delete,
    path = "/user/delete",
    responses(
        (status = 200, description = "Identity deleted and access token revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid, expired or revoked token", body = ErrorResponse),
        (status = 404, description = "Identity no longer exists", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "user"
)]
#[instrument(skip(service, principal), fields(identity_id = %principal.identity_id))]
pub async fn delete_account(
    service: Extension<Arc<SessionService>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MessageResponse>, AuthError> {
    Ok(Json(service.delete_account(&principal).await?))
}
