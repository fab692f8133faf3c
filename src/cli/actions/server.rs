use crate::{
    api,
    cli::telemetry,
    oauth::{FederatedReconciler, HttpOAuthClient, Providers},
    session::{
        password::Argon2Hasher,
        revocation::{MemoryRevocationCache, RedisRevocationCache, RevocationCache},
        store::{IdentityStore, MemoryStore, PgStore},
        SessionConfig, SessionService,
    },
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    pub apply_schema: bool,
    pub session: SessionConfig,
    pub providers: Providers,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, the configuration is
/// rejected, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store: Arc<dyn IdentityStore> = match &args.dsn {
        Some(dsn) => {
            let store = PgStore::connect(dsn, args.db_max_connections).await?;
            if args.apply_schema {
                store.apply_schema().await?;
                info!("Schema applied");
            }
            Arc::new(store)
        }
        None => {
            warn!("No DSN configured, identities and sessions are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let revocations: Arc<dyn RevocationCache> = match &args.redis_url {
        Some(url) => {
            let cache = RedisRevocationCache::connect(url).await?;
            cache.ping().await.context("Redis did not answer PING")?;
            Arc::new(cache)
        }
        None => {
            warn!("No Redis URL configured, revocation markers are kept in memory");
            Arc::new(MemoryRevocationCache::new())
        }
    };

    let timeout = Duration::from_secs(args.session.provider_timeout_seconds());
    let mut service = SessionService::new(
        args.session,
        store,
        Arc::new(Argon2Hasher::new()),
        revocations,
    )
    .context("invalid session configuration")?;

    if !args.providers.is_empty() {
        let client = HttpOAuthClient::new(timeout).context("failed to build OAuth client")?;
        service = service.with_federation(FederatedReconciler::new(
            Arc::new(args.providers),
            Arc::new(client),
        ));
    }

    let result = api::new(args.port, Arc::new(service)).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let providers = args
        .providers
        .enabled()
        .iter()
        .map(|kind| kind.slug())
        .collect::<Vec<_>>();
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "store",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        (
            "revocations",
            args.redis_url
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("db_max_connections", args.db_max_connections.to_string()),
        ("apply_schema", args.apply_schema.to_string()),
        (
            "access_ttl_seconds",
            args.session.access_ttl_seconds().to_string(),
        ),
        (
            "refresh_ttl_seconds",
            args.session.refresh_ttl_seconds().to_string(),
        ),
        ("default_role", args.session.default_role().to_string()),
        (
            "providers",
            if providers.is_empty() {
                "none".to_string()
            } else {
                providers.join(",")
            },
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    hash.trim().chars().take(7).collect()
}

const BANNER: &str = r"
   ___________
  |  _______  |
  | |       | |
  | |   o   | |   G A T E K E E P {VERSION}
  | |       | |
  |_|_______|_|";
