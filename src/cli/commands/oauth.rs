use clap::{Arg, Command};

use crate::oauth::ProviderKind;

/// Argument ids and environment variables for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderArgs {
    pub kind: ProviderKind,
    pub client_id: (&'static str, &'static str),
    pub client_secret: (&'static str, &'static str),
    pub redirect_uri: (&'static str, &'static str),
    pub token_url: (&'static str, &'static str),
    pub profile_url: (&'static str, &'static str),
}

pub const PROVIDERS: [ProviderArgs; 3] = [
    ProviderArgs {
        kind: ProviderKind::Google,
        client_id: ("google-client-id", "GATEKEEP_GOOGLE_CLIENT_ID"),
        client_secret: ("google-client-secret", "GATEKEEP_GOOGLE_CLIENT_SECRET"),
        redirect_uri: ("google-redirect-uri", "GATEKEEP_GOOGLE_REDIRECT_URI"),
        token_url: ("google-token-url", "GATEKEEP_GOOGLE_TOKEN_URL"),
        profile_url: ("google-profile-url", "GATEKEEP_GOOGLE_PROFILE_URL"),
    },
    ProviderArgs {
        kind: ProviderKind::GitHub,
        client_id: ("github-client-id", "GATEKEEP_GITHUB_CLIENT_ID"),
        client_secret: ("github-client-secret", "GATEKEEP_GITHUB_CLIENT_SECRET"),
        redirect_uri: ("github-redirect-uri", "GATEKEEP_GITHUB_REDIRECT_URI"),
        token_url: ("github-token-url", "GATEKEEP_GITHUB_TOKEN_URL"),
        profile_url: ("github-profile-url", "GATEKEEP_GITHUB_PROFILE_URL"),
    },
    ProviderArgs {
        kind: ProviderKind::Facebook,
        client_id: ("facebook-client-id", "GATEKEEP_FACEBOOK_CLIENT_ID"),
        client_secret: ("facebook-client-secret", "GATEKEEP_FACEBOOK_CLIENT_SECRET"),
        redirect_uri: ("facebook-redirect-uri", "GATEKEEP_FACEBOOK_REDIRECT_URI"),
        token_url: ("facebook-token-url", "GATEKEEP_FACEBOOK_TOKEN_URL"),
        profile_url: ("facebook-profile-url", "GATEKEEP_FACEBOOK_PROFILE_URL"),
    },
];

#[must_use]
pub fn with_args(command: Command) -> Command {
    PROVIDERS
        .iter()
        .fold(command, |command, provider| with_provider_args(command, provider))
}

// A provider is enabled by its client id. `validate` checks the rest.
fn with_provider_args(command: Command, provider: &ProviderArgs) -> Command {
    let name = provider.kind.display_name();
    command
        .arg(
            Arg::new(provider.client_id.0)
                .long(provider.client_id.0)
                .help(format!("{name} OAuth client id, enables {name} login"))
                .env(provider.client_id.1),
        )
        .arg(
            Arg::new(provider.client_secret.0)
                .long(provider.client_secret.0)
                .help(format!("{name} OAuth client secret"))
                .env(provider.client_secret.1)
                .hide_env_values(true)
                .requires(provider.client_id.0),
        )
        .arg(
            Arg::new(provider.redirect_uri.0)
                .long(provider.redirect_uri.0)
                .help(format!("{name} OAuth redirect URI"))
                .env(provider.redirect_uri.1)
                .requires(provider.client_id.0),
        )
        .arg(
            Arg::new(provider.token_url.0)
                .long(provider.token_url.0)
                .help(format!("Override the {name} token endpoint"))
                .env(provider.token_url.1)
                .requires(provider.client_id.0),
        )
        .arg(
            Arg::new(provider.profile_url.0)
                .long(provider.profile_url.0)
                .help(format!("Override the {name} profile endpoint"))
                .env(provider.profile_url.1)
                .requires(provider.client_id.0),
        )
}

/// A provider with a client id also needs a secret and a redirect uri.
///
/// # Errors
/// Returns an error string naming the first missing argument.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    for provider in &PROVIDERS {
        if !matches.contains_id(provider.client_id.0) {
            continue;
        }
        for (id, _) in [provider.client_secret, provider.redirect_uri] {
            if !matches.contains_id(id) {
                return Err(format!(
                    "Missing required argument: --{id} (required when --{} is set)",
                    provider.client_id.0
                ));
            }
        }
    }
    Ok(())
}
