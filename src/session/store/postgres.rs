//! Postgres store (sqlx).

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Postgres, Transaction,
};
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::{is_unique_violation, IdentityStore, StoreTransaction, UnitOfWork, DUPLICATE_EMAIL};
use crate::session::{
    error::AuthError,
    models::{Identity, IdentityId, NewIdentity, Session},
};

/// Schema applied by [`PgStore::apply_schema`].
pub const SCHEMA_SQL: &str = include_str!("../../../sql/schema.sql");

const IDENTITY_COLUMNS: &str =
    "id, name, email, password_hash, provider, provider_subject_id, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn apply_schema(&self) -> anyhow::Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = "sql/schema.sql"
        );
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn begin(&self) -> Result<UnitOfWork, AuthError> {
        let tx = self.pool.begin().await?;
        Ok(UnitOfWork::new(Box::new(PgTransaction { tx })))
    }

    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let span = select_span(&query);
        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let span = select_span(&query);
        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(select_span(query))
            .await?;
        Ok(())
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_identity(&mut self, id: IdentityId) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1");
        let span = select_span(&query);
        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn find_identity_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = $1");
        let span = select_span(&query);
        let identity = sqlx::query_as::<_, Identity>(&query)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(identity)
    }

    async fn insert_identity(&mut self, identity: NewIdentity) -> Result<Identity, AuthError> {
        let query = format!(
            r"
            INSERT INTO identities
                (name, email, password_hash, provider, provider_subject_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {IDENTITY_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let result = sqlx::query_as::<_, Identity>(&query)
            .bind(&identity.name)
            .bind(&identity.email)
            .bind(identity.password_hash.as_deref())
            .bind(identity.provider.as_deref())
            .bind(identity.provider_subject_id.as_deref())
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await;

        match result {
            Ok(identity) => Ok(identity),
            Err(err) if is_unique_violation(&err) => {
                Err(AuthError::DuplicateIdentity(DUPLICATE_EMAIL.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn link_provider(
        &mut self,
        id: IdentityId,
        provider: &str,
        provider_subject_id: &str,
    ) -> Result<Identity, AuthError> {
        let query = format!(
            r"
            UPDATE identities
            SET provider = $2, provider_subject_id = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {IDENTITY_COLUMNS}
            "
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        sqlx::query_as::<_, Identity>(&query)
            .bind(id.as_uuid())
            .bind(provider)
            .bind(provider_subject_id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await?
            .ok_or_else(|| AuthError::not_found("user not found"))
    }

    async fn delete_identity(&mut self, id: IdentityId) -> Result<bool, AuthError> {
        let query = "DELETE FROM identities WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_session(
        &mut self,
        identity_id: IdentityId,
        refresh_token_hash: &str,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        // The unique index on identity_id turns a concurrent second insert into an update.
        let query = r"
            INSERT INTO sessions
                (identity_id, refresh_token_hash, refresh_expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (identity_id) DO UPDATE
            SET refresh_token_hash = EXCLUDED.refresh_token_hash,
                refresh_expires_at = EXCLUDED.refresh_expires_at,
                updated_at = NOW()
            RETURNING id, identity_id, refresh_token_hash, refresh_expires_at, created_at, updated_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let session = sqlx::query_as::<_, Session>(query)
            .bind(identity_id.as_uuid())
            .bind(refresh_token_hash)
            .bind(refresh_expires_at)
            .fetch_one(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(session)
    }

    async fn find_session(
        &mut self,
        identity_id: IdentityId,
    ) -> Result<Option<Session>, AuthError> {
        // Row lock until commit: a concurrent refresh waits here and then
        // sees the rotated fingerprint.
        let query = r"
            SELECT id, identity_id, refresh_token_hash, refresh_expires_at, created_at, updated_at
            FROM sessions
            WHERE identity_id = $1
            FOR UPDATE
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT FOR UPDATE",
            db.statement = query
        );
        let session = sqlx::query_as::<_, Session>(query)
            .bind(identity_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(session)
    }

    async fn delete_session(&mut self, identity_id: IdentityId) -> Result<bool, AuthError> {
        let query = "DELETE FROM sessions WHERE identity_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(identity_id.as_uuid())
            .execute(&mut *self.tx)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), AuthError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn select_span(query: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    )
}
