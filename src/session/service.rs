//! Operation orchestration.
//!
//! Each mutating operation opens exactly one [`UnitOfWork`] and commits it only
//! after every step succeeded; any `?` on the way out drops it and rolls back.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    config::SessionConfig,
    error::AuthError,
    issuer::SessionIssuer,
    models::{IdentityId, MessageResponse, NewIdentity, Principal, ProfileResponse, TokenPair},
    password::{verify_password, PasswordHasher},
    revocation::RevocationCache,
    revoker::SessionRevoker,
    store::{IdentityStore, DUPLICATE_EMAIL},
    token::fingerprint,
    validate,
    verifier::{AccessVerifier, INVALID_TOKEN},
};
use crate::oauth::{FederatedReconciler, ProviderKind};

pub const REGISTERED: &str = "User registered successfully";
pub const LOGGED_OUT: &str = "logout successful";
pub const ACCOUNT_DELETED: &str = "account deleted successfully";

pub struct SessionService {
    config: SessionConfig,
    store: Arc<dyn IdentityStore>,
    hasher: Arc<dyn PasswordHasher>,
    issuer: SessionIssuer,
    verifier: AccessVerifier,
    revoker: SessionRevoker,
    federation: Option<FederatedReconciler>,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("config", &self.config)
            .field("federation", &self.federation)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    /// # Errors
    /// Returns a validation error if `config` is unusable.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn IdentityStore>,
        hasher: Arc<dyn PasswordHasher>,
        revocations: Arc<dyn RevocationCache>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        Ok(Self {
            issuer: SessionIssuer::new(&config),
            verifier: AccessVerifier::new(&config, Arc::clone(&revocations)),
            revoker: SessionRevoker::new(&config, revocations),
            config,
            store,
            hasher,
            federation: None,
        })
    }

    #[must_use]
    pub fn with_federation(mut self, reconciler: FederatedReconciler) -> Self {
        self.federation = Some(reconciler);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn federation(&self) -> Option<&FederatedReconciler> {
        self.federation.as_ref()
    }

    /// Create a password identity.
    ///
    /// # Errors
    /// `Validation` for bad input, `DuplicateIdentity` when the email is taken.
    #[instrument(skip(self, name, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<MessageResponse, AuthError> {
        let email = validate::registration(name, email, password)?;
        if self.store.find_identity_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateIdentity(DUPLICATE_EMAIL.to_string()));
        }
        // Hashing happens before the unit of work opens; the insert still
        // catches a concurrent registration of the same email.
        let password_hash = self.hash_password(password).await?;

        let mut uow = self.store.begin().await?;
        let identity = uow
            .insert_identity(NewIdentity {
                name: name.trim().to_string(),
                email,
                password_hash: Some(password_hash),
                provider: None,
                provider_subject_id: None,
            })
            .await?;
        uow.commit().await?;

        info!(identity_id = %identity.id, "identity registered");
        Ok(MessageResponse::new(REGISTERED))
    }

    /// Verify credentials and issue (or rotate) the identity's session.
    ///
    /// # Errors
    /// `NotFound` for an unknown email, `Authentication` for a wrong password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = validate::login(email, password)?;
        let identity = self
            .store
            .find_identity_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::not_found("user not found"))?;

        if !self
            .check_password(identity.password_hash.clone(), password)
            .await?
        {
            warn!(identity_id = %identity.id, "wrong password");
            return Err(AuthError::authentication("wrong password"));
        }

        let mut uow = self.store.begin().await?;
        // The identity may have been deleted while the password was checked.
        if uow.find_identity(identity.id).await?.is_none() {
            return Err(AuthError::not_found("user not found"));
        }
        let pair = self
            .issuer
            .issue_or_rotate(&mut uow, identity.id, self.config.default_role())
            .await?;
        uow.commit().await?;

        info!(identity_id = %identity.id, "login succeeded");
        Ok(pair)
    }

    /// Rotate the session of `identity_id` using its current refresh token.
    ///
    /// # Errors
    /// `Authentication` for an invalid, expired, foreign or superseded token;
    /// `NotFound` when the identity has no session.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(
        &self,
        identity_id: IdentityId,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self
            .verifier
            .verify_refresh(refresh_token, Utc::now().timestamp())?;
        if claims.subject_id != identity_id {
            return Err(AuthError::authentication(INVALID_TOKEN));
        }

        let mut uow = self.store.begin().await?;
        let session = uow
            .find_session(identity_id)
            .await?
            .ok_or_else(|| AuthError::not_found("session not found"))?;
        if session.refresh_token_hash != fingerprint(refresh_token) {
            warn!(%identity_id, "refresh token mismatch");
            return Err(AuthError::authentication("refresh token mismatch"));
        }

        let pair = self
            .issuer
            .issue_or_rotate(&mut uow, identity_id, &claims.role)
            .await?;
        uow.commit().await?;

        info!(%identity_id, "session refreshed");
        Ok(pair)
    }

    /// Refresh when the caller only presents the refresh token; its own
    /// subject names the identity.
    ///
    /// # Errors
    /// Same as [`Self::refresh`].
    pub async fn refresh_presented(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .verifier
            .verify_refresh(refresh_token, Utc::now().timestamp())?;
        self.refresh(claims.subject_id, refresh_token).await
    }

    /// End the caller's session and revoke the access token it used.
    ///
    /// # Errors
    /// Store failures propagate and commit nothing. The revocation marker is
    /// written only after the commit succeeded.
    #[instrument(skip(self, principal), fields(identity_id = %principal.identity_id))]
    pub async fn logout(&self, principal: &Principal) -> Result<MessageResponse, AuthError> {
        let mut uow = self.store.begin().await?;
        let pending = self
            .revoker
            .revoke(&mut uow, principal.identity_id, &principal.token)
            .await?;
        uow.commit().await?;
        self.revoker.publish(pending).await?;

        info!("logged out");
        Ok(MessageResponse::new(LOGGED_OUT))
    }

    /// Federated login: provider calls first, then one unit of work for the
    /// find-or-create, link and issue steps.
    ///
    /// # Errors
    /// `NotFound` when federation or the provider is not configured,
    /// `ExternalProvider` for provider failures.
    #[instrument(skip(self, code))]
    pub async fn federated_login(
        &self,
        kind: ProviderKind,
        code: &str,
    ) -> Result<TokenPair, AuthError> {
        let reconciler = self
            .federation
            .as_ref()
            .ok_or_else(|| AuthError::not_found(format!("provider {} is not configured", kind.slug())))?;
        let profile = reconciler.fetch_profile(kind, code).await?;

        let mut uow = self.store.begin().await?;
        let pair = reconciler
            .reconcile(&mut uow, &self.issuer, &profile, self.config.default_role())
            .await?;
        uow.commit().await?;

        info!(provider = %kind, "federated login succeeded");
        Ok(pair)
    }

    /// # Errors
    /// `NotFound` when the identity no longer exists.
    #[instrument(skip(self))]
    pub async fn profile(&self, identity_id: IdentityId) -> Result<ProfileResponse, AuthError> {
        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        Ok(ProfileResponse::from(&identity))
    }

    /// Delete the caller's identity (cascading to its session) in one unit of
    /// work, then revoke the access token it used.
    ///
    /// # Errors
    /// `NotFound` when the identity no longer exists.
    #[instrument(skip(self, principal), fields(identity_id = %principal.identity_id))]
    pub async fn delete_account(&self, principal: &Principal) -> Result<MessageResponse, AuthError> {
        let mut uow = self.store.begin().await?;
        if !uow.delete_identity(principal.identity_id).await? {
            return Err(AuthError::not_found("user not found"));
        }
        let pending = self
            .revoker
            .revoke(&mut uow, principal.identity_id, &principal.token)
            .await?;
        uow.commit().await?;
        self.revoker.publish(pending).await?;

        info!("account deleted");
        Ok(MessageResponse::new(ACCOUNT_DELETED))
    }

    /// Argon2 is CPU bound; run it on the blocking pool.
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| AuthError::Internal(format!("password hashing task failed: {err}")))?
    }

    async fn check_password(
        &self,
        stored_hash: Option<String>,
        password: &str,
    ) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            verify_password(hasher.as_ref(), stored_hash.as_deref(), &password)
        })
        .await
        .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))
    }

    /// Gate a protected request.
    ///
    /// # Errors
    /// `Authentication` with the rejection reason.
    pub async fn authorize(&self, access_token: &str) -> Result<Principal, AuthError> {
        self.verifier.authorize(access_token).await
    }
}
