//! Error taxonomy shared by every session lifecycle operation.

use thiserror::Error;

use super::token::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing payload fields.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    DuplicateIdentity(String),
    /// Wrong password, invalid/expired/revoked token, refresh-token mismatch.
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    NotFound(String),
    /// Token exchange, profile fetch, or unusable provider profile.
    #[error("{0}")]
    ExternalProvider(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// Signing or hashing failures; never caused by the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalProvider(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Client-side errors are caused by the request; everything else is on us.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::DuplicateIdentity(_)
                | Self::Authentication(_)
                | Self::NotFound(_)
        )
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(message) => Self::Internal(message),
            TokenError::UnsupportedAlg(_) => {
                Self::Authentication("unsupported token algorithm".to_string())
            }
            _ => Self::Authentication("invalid token".to_string()),
        }
    }
}
