//! Access verifier.
//!
//! Every protected request walks
//! `Unverified -> SignatureOk -> NotExpired -> NotRevoked -> Authorized`.
//! The first failing stage rejects; revocation is only consulted for tokens
//! that are still within their lifetime.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::{
    config::SessionConfig,
    error::AuthError,
    models::Principal,
    revocation::RevocationCache,
    token::{fingerprint, Claims, TokenKind, TokenSigner},
};

pub const INVALID_TOKEN: &str = "invalid token";
pub const TOKEN_EXPIRED: &str = "token expired";
pub const TOKEN_REVOKED: &str = "token has been revoked";

#[derive(Debug)]
enum Stage {
    Unverified,
    SignatureOk(Claims),
    NotExpired(Claims),
    NotRevoked(Claims),
}

#[derive(Clone)]
pub struct AccessVerifier {
    signer: TokenSigner,
    revocations: Arc<dyn RevocationCache>,
}

impl std::fmt::Debug for AccessVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessVerifier")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl AccessVerifier {
    #[must_use]
    pub fn new(config: &SessionConfig, revocations: Arc<dyn RevocationCache>) -> Self {
        Self {
            signer: TokenSigner::new(config.signing_key().clone()),
            revocations,
        }
    }

    /// Run the full state machine on a raw (unprefixed) access token.
    ///
    /// # Errors
    /// Rejections are authentication errors; a failing revocation cache is
    /// propagated as-is.
    pub async fn authorize(&self, token: &str) -> Result<Principal, AuthError> {
        self.authorize_at(token, Utc::now().timestamp()).await
    }

    pub(crate) async fn authorize_at(&self, token: &str, now: i64) -> Result<Principal, AuthError> {
        let mut stage = Stage::Unverified;
        loop {
            stage = match stage {
                Stage::Unverified => Stage::SignatureOk(self.verify_signature(token, TokenKind::Access)?),
                Stage::SignatureOk(claims) => Stage::NotExpired(check_expiry(claims, now)?),
                Stage::NotExpired(claims) => {
                    if self.revocations.is_revoked(&fingerprint(token)).await? {
                        debug!(subject_id = %claims.subject_id, "rejected revoked token");
                        return Err(AuthError::authentication(TOKEN_REVOKED));
                    }
                    Stage::NotRevoked(claims)
                }
                Stage::NotRevoked(claims) => {
                    return Ok(Principal {
                        identity_id: claims.subject_id,
                        role: claims.role,
                        token: token.to_string(),
                        expires_at: claims.exp,
                    });
                }
            };
        }
    }

    /// Signature and expiry checks for a refresh token; revocation does not apply.
    ///
    /// # Errors
    /// Returns an authentication error for anything but a live refresh token.
    pub fn verify_refresh(&self, token: &str, now: i64) -> Result<Claims, AuthError> {
        let claims = self.verify_signature(token, TokenKind::Refresh)?;
        check_expiry(claims, now)
    }

    fn verify_signature(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.signer.decode(token).map_err(|err| {
            debug!("token rejected: {err}");
            AuthError::from(err)
        })?;
        if claims.kind != expected {
            debug!(kind = ?claims.kind, expected = ?expected, "token of the wrong kind");
            return Err(AuthError::authentication(INVALID_TOKEN));
        }
        Ok(claims)
    }
}

fn check_expiry(claims: Claims, now: i64) -> Result<Claims, AuthError> {
    if claims.exp <= now {
        return Err(AuthError::authentication(TOKEN_EXPIRED));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{models::IdentityId, revocation::MemoryRevocationCache};
    use secrecy::SecretString;
    use std::time::Duration;

    const KEY: &str = "0123456789abcdef0123456789abcdef";
    const NOW: i64 = 1_700_000_000;

    fn config() -> SessionConfig {
        SessionConfig::new(SecretString::from(KEY.to_string()))
    }

    fn token(kind: TokenKind, exp: i64) -> anyhow::Result<(IdentityId, String)> {
        let id = IdentityId::new();
        let signer = TokenSigner::new(SecretString::from(KEY.to_string()));
        Ok((id, signer.sign(&Claims::new(id, "user", kind, NOW, exp))?))
    }

    #[tokio::test]
    async fn live_access_token_is_authorized() -> anyhow::Result<()> {
        let verifier = AccessVerifier::new(&config(), Arc::new(MemoryRevocationCache::new()));
        let (id, token) = token(TokenKind::Access, NOW + 60)?;
        let principal = verifier.authorize_at(&token, NOW).await?;
        assert_eq!(principal.identity_id, id);
        assert_eq!(principal.role, "user");
        assert_eq!(principal.token, token);
        assert_eq!(principal.expires_at, NOW + 60);
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_rejected_before_revocation() -> anyhow::Result<()> {
        let cache = Arc::new(MemoryRevocationCache::new());
        let verifier = AccessVerifier::new(&config(), cache.clone());
        let (_, token) = token(TokenKind::Access, NOW - 1)?;

        let err = verifier.authorize_at(&token, NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == TOKEN_EXPIRED));

        cache.revoke(&fingerprint(&token), Duration::from_secs(60)).await?;
        let err = verifier.authorize_at(&token, NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == TOKEN_EXPIRED));
        Ok(())
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() -> anyhow::Result<()> {
        let cache = Arc::new(MemoryRevocationCache::new());
        let verifier = AccessVerifier::new(&config(), cache.clone());
        let (_, revoked) = token(TokenKind::Access, NOW + 60)?;
        let (_, other) = token(TokenKind::Access, NOW + 60)?;
        cache.revoke(&fingerprint(&revoked), Duration::from_secs(60)).await?;

        let err = verifier.authorize_at(&revoked, NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == TOKEN_REVOKED));
        assert!(verifier.authorize_at(&other, NOW).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_token_cannot_authorize() -> anyhow::Result<()> {
        let verifier = AccessVerifier::new(&config(), Arc::new(MemoryRevocationCache::new()));
        let (_, token) = token(TokenKind::Refresh, NOW + 60)?;
        let err = verifier.authorize_at(&token, NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == INVALID_TOKEN));
        Ok(())
    }

    #[tokio::test]
    async fn garbage_and_foreign_tokens_are_invalid() -> anyhow::Result<()> {
        let verifier = AccessVerifier::new(&config(), Arc::new(MemoryRevocationCache::new()));
        let err = verifier.authorize_at("not-a-token", NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == INVALID_TOKEN));

        let foreign = TokenSigner::new(SecretString::from("f".repeat(32)))
            .sign(&Claims::new(IdentityId::new(), "user", TokenKind::Access, NOW, NOW + 60))?;
        let err = verifier.authorize_at(&foreign, NOW).await;
        assert!(matches!(err, Err(AuthError::Authentication(msg)) if msg == INVALID_TOKEN));
        Ok(())
    }

    #[test]
    fn verify_refresh_checks_kind_and_expiry() -> anyhow::Result<()> {
        let verifier = AccessVerifier::new(&config(), Arc::new(MemoryRevocationCache::new()));
        let (id, refresh) = token(TokenKind::Refresh, NOW + 60)?;
        assert_eq!(verifier.verify_refresh(&refresh, NOW)?.subject_id, id);
        assert!(verifier.verify_refresh(&refresh, NOW + 60).is_err());

        let (_, access) = token(TokenKind::Access, NOW + 60)?;
        assert!(verifier.verify_refresh(&access, NOW).is_err());
        Ok(())
    }
}
