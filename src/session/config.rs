//! Session configuration: lifetimes, role, and the signing key.
//!
//! Every token lifetime in the crate is read from here.

use secrecy::{ExposeSecret, SecretString};

use super::error::AuthError;

pub(crate) const DEFAULT_ACCESS_TTL_SECONDS: i64 = 24 * 60 * 60;
pub(crate) const DEFAULT_REFRESH_TTL_SECONDS: i64 = 90 * 24 * 60 * 60;
pub(crate) const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;
pub(crate) const DEFAULT_ROLE: &str = "user";
/// HS256 keys shorter than the hash output weaken the MAC.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;
/// Upper bound for either token lifetime (ten years).
pub const MAX_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct SessionConfig {
    signing_key: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    provider_timeout_seconds: u64,
    default_role: String,
}

impl SessionConfig {
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            provider_timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECONDS,
            default_role: DEFAULT_ROLE.to_string(),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_provider_timeout_seconds(mut self, seconds: u64) -> Self {
        self.provider_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: String) -> Self {
        self.default_role = role;
        self
    }

    /// Reject configurations the issuer could not work with.
    ///
    /// # Errors
    /// Returns a validation error for short keys or out-of-range lifetimes.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.signing_key.expose_secret().len() < MIN_SIGNING_KEY_BYTES {
            return Err(AuthError::validation(format!(
                "signing key must be at least {MIN_SIGNING_KEY_BYTES} bytes"
            )));
        }
        if self.access_ttl_seconds <= 0 || self.refresh_ttl_seconds <= 0 {
            return Err(AuthError::validation("token lifetimes must be positive"));
        }
        if self.access_ttl_seconds > MAX_TTL_SECONDS || self.refresh_ttl_seconds > MAX_TTL_SECONDS {
            return Err(AuthError::validation(format!(
                "token lifetimes must not exceed {MAX_TTL_SECONDS} seconds"
            )));
        }
        if self.refresh_ttl_seconds < self.access_ttl_seconds {
            return Err(AuthError::validation(
                "refresh token lifetime must not be shorter than the access token lifetime",
            ));
        }
        if self.default_role.trim().is_empty() {
            return Err(AuthError::validation("default role must not be empty"));
        }
        Ok(())
    }

    pub(crate) fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn provider_timeout_seconds(&self) -> u64 {
        self.provider_timeout_seconds
    }

    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("signing_key", &"***")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("provider_timeout_seconds", &self.provider_timeout_seconds)
            .field("default_role", &self.default_role)
            .finish()
    }
}
