//! Revocation markers for access tokens revoked before their natural expiry.
//!
//! A marker is keyed by token fingerprint, carries no payload, and disappears
//! once its TTL elapses. [`RedisRevocationCache`] shares markers between
//! instances and across restarts; [`MemoryRevocationCache`] keeps them in the
//! process.

use anyhow::Context;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::{info_span, Instrument};

use super::error::AuthError;

#[async_trait]
pub trait RevocationCache: Send + Sync {
    /// Record `fingerprint` as revoked for `ttl`.
    async fn revoke(&self, fingerprint: &str, ttl: Duration) -> Result<(), AuthError>;

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, AuthError>;
}

/// Process-local TTL map. Expired markers are pruned on every write.
#[derive(Debug, Default)]
pub struct MemoryRevocationCache {
    markers: Mutex<HashMap<String, Instant>>,
}

impl MemoryRevocationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live markers only.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.markers
            .lock()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RevocationCache for MemoryRevocationCache {
    async fn revoke(&self, fingerprint: &str, ttl: Duration) -> Result<(), AuthError> {
        let now = Instant::now();
        let mut markers = self.markers.lock().await;
        markers.retain(|_, expires_at| *expires_at > now);
        if !ttl.is_zero() {
            markers.insert(fingerprint.to_string(), now + ttl);
        }
        Ok(())
    }

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, AuthError> {
        let markers = self.markers.lock().await;
        Ok(markers
            .get(fingerprint)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }
}

/// Key prefix for markers written by [`RedisRevocationCache`].
pub const REDIS_KEY_PREFIX: &str = "gatekeep:revoked:";

/// Markers in Redis: `SET <prefix><fingerprint> 1 EX <ttl>` and `EXISTS`.
#[derive(Clone)]
pub struct RedisRevocationCache {
    connection: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisRevocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRevocationCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisRevocationCache {
    /// Connect to `url` (`redis://` or `rediss://`). The connection manager
    /// reconnects on its own after failures.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid Redis URL")?;
        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self {
            connection,
            prefix: REDIS_KEY_PREFIX.to_string(),
        })
    }

    /// Namespace keys differently, e.g. per test run.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, fingerprint: &str) -> String {
        format!("{}{fingerprint}", self.prefix)
    }

    /// # Errors
    /// Returns a persistence error if Redis does not answer.
    pub async fn ping(&self) -> Result<(), AuthError> {
        let mut connection = self.connection.clone();
        let reply: RedisResult<String> = redis::cmd("PING")
            .query_async(&mut connection)
            .instrument(cache_span("PING"))
            .await;
        reply.map(|_| ()).map_err(cache_error)
    }
}

#[async_trait]
impl RevocationCache for RedisRevocationCache {
    async fn revoke(&self, fingerprint: &str, ttl: Duration) -> Result<(), AuthError> {
        let seconds = ttl_seconds(ttl);
        if seconds == 0 {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        let reply: RedisResult<()> = connection
            .set_ex(self.key(fingerprint), "1", seconds)
            .instrument(cache_span("SET"))
            .await;
        reply.map_err(cache_error)
    }

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, AuthError> {
        let mut connection = self.connection.clone();
        let reply: RedisResult<bool> = connection
            .exists(self.key(fingerprint))
            .instrument(cache_span("EXISTS"))
            .await;
        reply.map_err(cache_error)
    }
}

/// Whole seconds, rounded up so a marker never expires before its token.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

fn cache_span(operation: &'static str) -> tracing::Span {
    info_span!("cache.command", db.system = "redis", db.operation = operation)
}

fn cache_error(err: redis::RedisError) -> AuthError {
    AuthError::persistence(format!("revocation cache: {err}"))
}
