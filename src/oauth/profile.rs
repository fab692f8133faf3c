//! Normalization of provider profile payloads.

use serde::Deserialize;
use serde_json::Value;

use super::config::ProviderKind;
use crate::session::{error::AuthError, validate::normalize_email};

/// Provider-independent view of a federated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: ProviderKind,
    pub provider_subject_id: String,
    pub email: Option<String>,
    /// `Some(false)` only when the provider says so explicitly.
    pub email_verified: Option<bool>,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ProviderProfile {
    /// Canonical email used to match local identities.
    ///
    /// # Errors
    /// Fails when the provider returned no usable email, or flagged it unverified.
    pub fn canonical_email(&self) -> Result<String, AuthError> {
        let email = self
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AuthError::external("email not available"))?;
        if self.email_verified == Some(false) {
            return Err(AuthError::external("email not verified"));
        }
        Ok(email)
    }
}

#[derive(Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    verified_email: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct FacebookUser {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

/// Map a raw profile response onto [`ProviderProfile`].
///
/// # Errors
/// Returns an external-provider error if the payload does not have the
/// provider's shape.
pub fn normalize(kind: ProviderKind, payload: Value) -> Result<ProviderProfile, AuthError> {
    let malformed =
        |err: serde_json::Error| AuthError::external(format!("malformed {kind} profile: {err}"));

    let profile = match kind {
        ProviderKind::Google => {
            let user: GoogleUser = serde_json::from_value(payload).map_err(malformed)?;
            ProviderProfile {
                provider: kind,
                display_name: user.name.unwrap_or_default(),
                provider_subject_id: user.id,
                email: user.email,
                email_verified: user.verified_email,
                avatar_url: user.picture,
            }
        }
        ProviderKind::GitHub => {
            let user: GitHubUser = serde_json::from_value(payload).map_err(malformed)?;
            ProviderProfile {
                provider: kind,
                provider_subject_id: user.id.to_string(),
                display_name: user
                    .name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(user.login),
                email: user.email,
                email_verified: None,
                avatar_url: user.avatar_url,
            }
        }
        ProviderKind::Facebook => {
            let user: FacebookUser = serde_json::from_value(payload).map_err(malformed)?;
            ProviderProfile {
                provider: kind,
                provider_subject_id: user.id,
                display_name: user.name.unwrap_or_default(),
                email: user.email,
                email_verified: None,
                avatar_url: user
                    .picture
                    .and_then(|picture| picture.data)
                    .and_then(|data| data.url),
            }
        }
    };
    Ok(profile)
}
