//! Session issuer: mints a token pair and writes the identity's single session.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::{
    config::SessionConfig,
    error::AuthError,
    models::{IdentityId, TokenPair},
    store::UnitOfWork,
    token::{fingerprint, Claims, TokenKind, TokenSigner},
};

/// Layout of the human-readable expiry strings.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SessionIssuer {
    signer: TokenSigner,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            signer: TokenSigner::new(config.signing_key().clone()),
            access_ttl_seconds: config.access_ttl_seconds(),
            refresh_ttl_seconds: config.refresh_ttl_seconds(),
        }
    }

    /// Mint a fresh pair and upsert the identity's session with it.
    ///
    /// # Errors
    /// Signing failures are internal errors; store failures propagate and the
    /// caller's unit of work rolls back.
    #[instrument(skip(self, uow))]
    pub async fn issue_or_rotate(
        &self,
        uow: &mut UnitOfWork,
        identity_id: IdentityId,
        role: &str,
    ) -> Result<TokenPair, AuthError> {
        self.issue_at(uow, identity_id, role, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn issue_at(
        &self,
        uow: &mut UnitOfWork,
        identity_id: IdentityId,
        role: &str,
        now: i64,
    ) -> Result<TokenPair, AuthError> {
        let access_exp = expiry(now, self.access_ttl_seconds)?;
        let refresh_exp = expiry(now, self.refresh_ttl_seconds)?;

        let access = Claims::new(identity_id, role, TokenKind::Access, now, access_exp);
        let refresh = Claims::new(identity_id, role, TokenKind::Refresh, now, refresh_exp);
        let access_token = self.signer.sign(&access)?;
        let refresh_token = self.signer.sign(&refresh)?;

        let refresh_expires_at = timestamp(refresh_exp)?;
        let session = uow
            .upsert_session(identity_id, &fingerprint(&refresh_token), refresh_expires_at)
            .await?;
        debug!(session_id = %session.id, "session written");

        Ok(TokenPair {
            access_token: format!("Bearer {access_token}"),
            access_expires_at: timestamp(access_exp)?.format(EXPIRY_FORMAT).to_string(),
            refresh_token: format!("Bearer {refresh_token}"),
            refresh_expires_at: refresh_expires_at.format(EXPIRY_FORMAT).to_string(),
        })
    }
}

fn expiry(now: i64, ttl_seconds: i64) -> Result<i64, AuthError> {
    now.checked_add(ttl_seconds)
        .ok_or_else(|| AuthError::Internal(format!("expiry overflows: {now} + {ttl_seconds}")))
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AuthError::Internal(format!("expiry {seconds} out of range")))
}
