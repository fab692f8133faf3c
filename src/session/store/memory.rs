//! In-process store.
//!
//! A transaction holds the store lock from `begin` until it is committed or
//! dropped and works on a staged copy, so concurrent operations serialize and
//! an uncommitted transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{IdentityStore, StoreTransaction, UnitOfWork, DUPLICATE_EMAIL};
use crate::session::{
    error::AuthError,
    models::{Identity, IdentityId, NewIdentity, Session},
};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    identities: HashMap<IdentityId, Identity>,
    // Keyed by owning identity: one session per identity by construction.
    sessions: HashMap<IdentityId, Session>,
}

impl MemoryState {
    fn identity_by_email(&self, email: &str) -> Option<&Identity> {
        self.identities.values().find(|identity| identity.email == email)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn identity_count(&self) -> usize {
        self.state.lock().await.identities.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Committed session of an identity, if any.
    pub async fn session_for(&self, identity_id: IdentityId) -> Option<Session> {
        self.state.lock().await.sessions.get(&identity_id).cloned()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn begin(&self) -> Result<UnitOfWork, AuthError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(UnitOfWork::new(Box::new(MemoryTransaction { guard, staged })))
    }

    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, AuthError> {
        Ok(self.state.lock().await.identities.get(&id).cloned())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        Ok(self.state.lock().await.identity_by_email(email).cloned())
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_identity(&mut self, id: IdentityId) -> Result<Option<Identity>, AuthError> {
        Ok(self.staged.identities.get(&id).cloned())
    }

    async fn find_identity_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Identity>, AuthError> {
        Ok(self.staged.identity_by_email(email).cloned())
    }

    async fn insert_identity(&mut self, identity: NewIdentity) -> Result<Identity, AuthError> {
        if self.staged.identity_by_email(&identity.email).is_some() {
            return Err(AuthError::DuplicateIdentity(DUPLICATE_EMAIL.to_string()));
        }
        let now = Utc::now();
        let record = Identity {
            id: IdentityId::new(),
            name: identity.name,
            email: identity.email,
            password_hash: identity.password_hash,
            provider: identity.provider,
            provider_subject_id: identity.provider_subject_id,
            created_at: now,
            updated_at: now,
        };
        self.staged.identities.insert(record.id, record.clone());
        Ok(record)
    }

    async fn link_provider(
        &mut self,
        id: IdentityId,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<Identity, AuthError> {
        let identity = self
            .staged
            .identities
            .get_mut(&id)
            .ok_or_else(|| AuthError::not_found("user not found"))?;
        identity.provider = Some(provider.to_string());
        identity.provider_subject_id = Some(provider_subject_id.to_string());
        identity.updated_at = Utc::now();
        Ok(identity.clone())
    }

    async fn delete_identity(&mut self, id: IdentityId) -> Result<bool, AuthError> {
        let removed = self.staged.identities.remove(&id).is_some();
        if removed {
            self.staged.sessions.remove(&id);
        }
        Ok(removed)
    }

    async fn upsert_session(
        &mut self,
        identity_id: IdentityId,
        refresh_token_hash: &str,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        if !self.staged.identities.contains_key(&identity_id) {
            return Err(AuthError::persistence(format!(
                "identity {identity_id} does not exist"
            )));
        }
        let now = Utc::now();
        let session = self
            .staged
            .sessions
            .entry(identity_id)
            .and_modify(|session| {
                session.refresh_token_hash = refresh_token_hash.to_string();
                session.refresh_expires_at = refresh_expires_at;
                session.updated_at = now;
            })
            .or_insert_with(|| Session {
                id: Uuid::new_v4(),
                identity_id,
                refresh_token_hash: refresh_token_hash.to_string(),
                refresh_expires_at,
                created_at: now,
                updated_at: now,
            });
        Ok(session.clone())
    }

    async fn find_session(
        &mut self,
        identity_id: IdentityId,
    ) -> Result<Option<Session>, AuthError> {
        Ok(self.staged.sessions.get(&identity_id).cloned())
    }

    async fn delete_session(&mut self, identity_id: IdentityId) -> Result<bool, AuthError> {
        Ok(self.staged.sessions.remove(&identity_id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), AuthError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        debug!("memory transaction committed");
        Ok(())
    }
}
