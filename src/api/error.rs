use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::session::error::AuthError;

#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl AuthError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateIdentity(_) => StatusCode::CONFLICT,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ExternalProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_client_error() {
            debug!("request rejected: {self}");
        } else {
            error!("request failed: {self}");
        }

        // Server-side details stay in the logs.
        let message = match &self {
            Self::Persistence(_) | Self::Internal(_) => "internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
