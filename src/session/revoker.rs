//! Session revoker: ends the identity's session and blocks the presented
//! access token until it would have expired anyway.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

use super::{
    config::SessionConfig,
    error::AuthError,
    models::IdentityId,
    revocation::RevocationCache,
    store::UnitOfWork,
    token::{fingerprint, TokenSigner},
    verifier::INVALID_TOKEN,
};

#[derive(Clone)]
pub struct SessionRevoker {
    signer: TokenSigner,
    revocations: Arc<dyn RevocationCache>,
}

impl std::fmt::Debug for SessionRevoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRevoker")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl SessionRevoker {
    #[must_use]
    pub fn new(config: &SessionConfig, revocations: Arc<dyn RevocationCache>) -> Self {
        Self {
            signer: TokenSigner::new(config.signing_key().clone()),
            revocations,
        }
    }

    /// Delete the session (idempotent) inside `uow` and return the marker to
    /// write once `uow` has committed. `None` when the token has no lifetime
    /// left to block.
    ///
    /// # Errors
    /// A token that does not verify is an authentication error; store
    /// failures propagate.
    #[instrument(skip(self, uow, access_token))]
    pub async fn revoke(
        &self,
        uow: &mut UnitOfWork,
        identity_id: IdentityId,
        access_token: &str,
    ) -> Result<Option<PendingRevocation>, AuthError> {
        self.revoke_at(uow, identity_id, access_token, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn revoke_at(
        &self,
        uow: &mut UnitOfWork,
        identity_id: IdentityId,
        access_token: &str,
        now: i64,
    ) -> Result<Option<PendingRevocation>, AuthError> {
        // Expiry is read from the verified claims, never from the caller.
        let claims = self.signer.decode(access_token)?;
        if claims.subject_id != identity_id {
            return Err(AuthError::authentication(INVALID_TOKEN));
        }

        let removed = uow.delete_session(identity_id).await?;
        debug!(removed, "session deleted");

        let remaining = claims.exp.saturating_sub(now);
        Ok((remaining > 0).then(|| PendingRevocation {
            fingerprint: fingerprint(access_token),
            ttl: Duration::from_secs(remaining.unsigned_abs()),
        }))
    }

    /// Write a marker produced by [`Self::revoke`]. Call only after commit.
    ///
    /// # Errors
    /// Cache failures propagate.
    pub async fn publish(&self, pending: Option<PendingRevocation>) -> Result<(), AuthError> {
        let Some(pending) = pending else {
            return Ok(());
        };
        self.revocations
            .revoke(&pending.fingerprint, pending.ttl)
            .await?;
        debug!(ttl_seconds = pending.ttl.as_secs(), "revocation marker written");
        Ok(())
    }
}

/// Revocation marker held back until the session deletion is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRevocation {
    fingerprint: String,
    ttl: Duration,
}

impl PendingRevocation {
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
