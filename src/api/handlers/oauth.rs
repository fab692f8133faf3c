use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

use crate::{
    api::error::ErrorResponse,
    oauth::ProviderKind,
    session::{error::AuthError, models::TokenPair, service::SessionService},
};

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code issued by the provider.
    pub code: Option<String>,
    /// Set by the provider when the user denied consent.
    pub error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google, github or facebook"),
        CallbackParams
    ),
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Missing code", body = ErrorResponse),
        (status = 404, description = "Unknown or unconfigured provider", body = ErrorResponse),
        (status = 502, description = "Provider exchange or profile fetch failed", body = ErrorResponse),
    ),
    tag = "oauth"
)]
#[instrument(skip(service, params))]
pub async fn callback(
    service: Extension<Arc<SessionService>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<TokenPair>, AuthError> {
    let kind: ProviderKind = provider.parse().map_err(AuthError::NotFound)?;

    if let Some(error) = params.error.filter(|error| !error.is_empty()) {
        return Err(AuthError::external(format!("{kind} returned error: {error}")));
    }
    let code = params
        .code
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| AuthError::validation("missing code"))?;

    Ok(Json(service.federated_login(kind, &code).await?))
}
