use crate::{
    cli::{
        actions::{server::Args, Action},
        commands::{self, oauth::PROVIDERS, session},
    },
    oauth::{ProviderConfig, Providers},
    session::SessionConfig,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    commands::validate(matches).map_err(|e| anyhow!(e))?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();
    let redis_url = matches.get_one::<String>("redis-url").cloned();
    let db_max_connections = matches
        .get_one::<u32>("db-max-connections")
        .copied()
        .unwrap_or(5);
    let apply_schema = matches.get_flag("apply-schema");

    let session = session_config(matches)?;
    session
        .validate()
        .context("invalid session configuration")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url,
        db_max_connections,
        apply_schema,
        session,
        providers: providers(matches),
    }))
}

fn session_config(matches: &clap::ArgMatches) -> Result<SessionConfig> {
    let signing_key = matches
        .get_one::<String>(session::ARG_SIGNING_KEY)
        .cloned()
        .context("missing required argument: --signing-key")?;

    let mut config = SessionConfig::new(SecretString::from(signing_key));
    if let Some(seconds) = matches.get_one::<i64>(session::ARG_ACCESS_TTL) {
        config = config.with_access_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<i64>(session::ARG_REFRESH_TTL) {
        config = config.with_refresh_ttl_seconds(*seconds);
    }
    if let Some(seconds) = matches.get_one::<u64>(session::ARG_PROVIDER_TIMEOUT) {
        config = config.with_provider_timeout_seconds(*seconds);
    }
    if let Some(role) = matches.get_one::<String>(session::ARG_DEFAULT_ROLE) {
        config = config.with_default_role(role.clone());
    }
    Ok(config)
}

fn providers(matches: &clap::ArgMatches) -> Providers {
    let value = |id: &str| matches.get_one::<String>(id).cloned();

    Providers::new(PROVIDERS.iter().filter_map(|provider| {
        let client_id = value(provider.client_id.0)?;
        let client_secret = value(provider.client_secret.0).unwrap_or_default();
        let redirect_uri = value(provider.redirect_uri.0).unwrap_or_default();

        let mut config = ProviderConfig::new(
            provider.kind,
            client_id,
            SecretString::from(client_secret),
            redirect_uri,
        );
        if let Some(url) = value(provider.token_url.0) {
            config = config.with_token_url(url);
        }
        if let Some(url) = value(provider.profile_url.0) {
            config = config.with_profile_url(url);
        }
        Some(config)
    }))
}
