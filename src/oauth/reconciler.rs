//! Federated identity reconciler.
//!
//! Provider calls happen in [`FederatedReconciler::fetch_profile`], before any
//! unit of work is opened. [`FederatedReconciler::reconcile`] then finds or
//! creates the local identity by email, records the provider link and hands
//! off to the session issuer, all inside the caller's unit of work.

use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    client::OAuthClient,
    config::{ProviderKind, Providers},
    profile::{normalize, ProviderProfile},
};
use crate::session::{
    error::AuthError,
    issuer::SessionIssuer,
    models::{NewIdentity, TokenPair},
    store::UnitOfWork,
};

#[derive(Clone)]
pub struct FederatedReconciler {
    providers: Arc<Providers>,
    client: Arc<dyn OAuthClient>,
}

impl std::fmt::Debug for FederatedReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedReconciler")
            .field("providers", &self.providers.enabled())
            .finish_non_exhaustive()
    }
}

impl FederatedReconciler {
    #[must_use]
    pub fn new(providers: Arc<Providers>, client: Arc<dyn OAuthClient>) -> Self {
        Self { providers, client }
    }

    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Exchange `code` and normalize the provider's profile.
    ///
    /// # Errors
    /// `Validation` for an empty code, `NotFound` for a provider that is not
    /// configured, `ExternalProvider` for anything the provider gets wrong.
    #[instrument(skip(self, code))]
    pub async fn fetch_profile(
        &self,
        kind: ProviderKind,
        code: &str,
    ) -> Result<ProviderProfile, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::validation("missing code"));
        }
        let provider = self
            .providers
            .get(kind)
            .ok_or_else(|| AuthError::not_found(format!("provider {} is not configured", kind.slug())))?;

        let access_token = self.client.exchange_code(provider, code.trim()).await?;
        let payload = self.client.fetch_profile(provider, &access_token).await?;
        normalize(kind, payload)
    }

    /// Find or create the identity for `profile` and issue its session.
    ///
    /// # Errors
    /// Any failure aborts the caller's unit of work.
    #[instrument(skip(self, uow, issuer, profile), fields(provider = %profile.provider))]
    pub async fn reconcile(
        &self,
        uow: &mut UnitOfWork,
        issuer: &SessionIssuer,
        profile: &ProviderProfile,
        role: &str,
    ) -> Result<TokenPair, AuthError> {
        let email = profile.canonical_email()?;
        let provider_name = profile.provider.display_name();

        let identity = match uow.find_identity_by_email(&email).await? {
            Some(existing) => {
                let linked = uow
                    .link_provider(existing.id, provider_name, &profile.provider_subject_id)
                    .await?;
                info!(identity_id = %linked.id, "linked provider to existing identity");
                linked
            }
            None => {
                let name = if profile.display_name.trim().is_empty() {
                    email.clone()
                } else {
                    profile.display_name.clone()
                };
                let created = uow
                    .insert_identity(NewIdentity {
                        name,
                        email,
                        password_hash: None,
                        provider: Some(provider_name.to_string()),
                        provider_subject_id: Some(profile.provider_subject_id.clone()),
                    })
                    .await?;
                info!(identity_id = %created.id, "created identity from provider profile");
                created
            }
        };

        issuer.issue_or_rotate(uow, identity.id, role).await
    }
}
