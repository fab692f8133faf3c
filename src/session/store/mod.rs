//! Identity and session persistence behind a transactional seam.
//!
//! Every mutation goes through a [`UnitOfWork`]. Dropping one without calling
//! [`UnitOfWork::commit`] rolls back whatever it staged, on every exit path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::ops::{Deref, DerefMut};

use super::{
    error::AuthError,
    models::{Identity, IdentityId, NewIdentity, Session},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Message used whenever an email is already taken.
pub const DUPLICATE_EMAIL: &str = "email already exists";

/// Store entry point: opens transactions and serves read-only lookups.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<UnitOfWork, AuthError>;

    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, AuthError>;

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), AuthError>;
}

/// Operations available inside a unit of work.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_identity(&mut self, id: IdentityId) -> Result<Option<Identity>, AuthError>;

    async fn find_identity_by_email(&mut self, email: &str)
        -> Result<Option<Identity>, AuthError>;

    /// Insert a new identity. A taken email is `DuplicateIdentity`.
    async fn insert_identity(&mut self, identity: NewIdentity) -> Result<Identity, AuthError>;

    /// Overwrite the provider link of an existing identity.
    async fn link_provider(
        &mut self,
        id: IdentityId,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<Identity, AuthError>;

    /// Delete an identity and its session. Returns `false` when nothing matched.
    async fn delete_identity(&mut self, id: IdentityId) -> Result<bool, AuthError>;

    /// Insert the identity's session, or overwrite it in place keeping the row id.
    async fn upsert_session(
        &mut self,
        identity_id: IdentityId,
        refresh_token_hash: &str,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError>;

    /// Read the identity's session and hold it until the unit of work ends,
    /// so a concurrent rotation cannot pass the same fingerprint check.
    async fn find_session(&mut self, identity_id: IdentityId)
        -> Result<Option<Session>, AuthError>;

    /// Idempotent; returns whether a row was removed.
    async fn delete_session(&mut self, identity_id: IdentityId) -> Result<bool, AuthError>;

    async fn commit(self: Box<Self>) -> Result<(), AuthError>;
}

/// Scoped transaction handle.
///
/// Derefs to the underlying [`StoreTransaction`]; `commit` consumes it.
pub struct UnitOfWork {
    tx: Box<dyn StoreTransaction>,
}

impl UnitOfWork {
    #[must_use]
    pub fn new(tx: Box<dyn StoreTransaction>) -> Self {
        Self { tx }
    }

    /// Make every staged write visible at once.
    ///
    /// # Errors
    /// Returns a persistence error if the backend refuses the commit.
    pub async fn commit(self) -> Result<(), AuthError> {
        self.tx.commit().await
    }
}

impl Deref for UnitOfWork {
    type Target = dyn StoreTransaction;

    fn deref(&self) -> &Self::Target {
        self.tx.as_ref()
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tx.as_mut()
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish_non_exhaustive()
    }
}

/// Postgres `unique_violation`.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
