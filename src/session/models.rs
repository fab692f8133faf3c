//! Identity, session, and token-pair types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Canonical identifier of an identity.
///
/// Attached once by the access verifier and passed around as-is; nothing
/// downstream parses identity ids out of strings again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for IdentityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: Option<String>,
    pub provider_subject_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Identity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id: Uuid = row.try_get("id")?;
        Ok(Self {
            id: IdentityId::from(id),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            provider: row.try_get("provider")?,
            provider_subject_id: row.try_get("provider_subject_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields supplied when creating an identity; the store assigns id and timestamps.
#[derive(Clone, Debug, Default)]
pub struct NewIdentity {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: Option<String>,
    pub provider_subject_id: Option<String>,
}

/// The single refresh-credential record owned by an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub identity_id: IdentityId,
    /// Fingerprint of the current refresh token, never the raw value.
    pub refresh_token_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let identity_id: Uuid = row.try_get("identity_id")?;
        Ok(Self {
            id: row.try_get("id")?,
            identity_id: IdentityId::from(identity_id),
            refresh_token_hash: row.try_get("refresh_token_hash")?,
            refresh_expires_at: row.try_get("refresh_expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Access/refresh pair returned to clients; never persisted as a unit.
#[derive(ToSchema, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    /// `Bearer `-prefixed access token.
    pub access_token: String,
    pub access_expires_at: String,
    /// `Bearer `-prefixed refresh token.
    pub refresh_token: String,
    pub refresh_expires_at: String,
}

impl TokenPair {
    /// Raw access token without the `Bearer ` prefix.
    #[must_use]
    pub fn access(&self) -> &str {
        strip_bearer(&self.access_token)
    }

    /// Raw refresh token without the `Bearer ` prefix.
    #[must_use]
    pub fn refresh(&self) -> &str {
        strip_bearer(&self.refresh_token)
    }
}

/// Verified caller attached to a protected request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub identity_id: IdentityId,
    pub role: String,
    /// The raw access token that authorized the request.
    pub token: String,
    pub expires_at: i64,
}

#[derive(ToSchema, Clone, Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub provider: Option<String>,
}

impl From<&Identity> for ProfileResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            provider: identity.provider.clone(),
        }
    }
}

fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}
