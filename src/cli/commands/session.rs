use clap::{Arg, Command};

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_ACCESS_TTL: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl-seconds";
pub const ARG_DEFAULT_ROLE: &str = "default-role";
pub const ARG_PROVIDER_TIMEOUT: &str = "provider-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("Symmetric HS256 signing key, at least 32 bytes")
                .env("GATEKEEP_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token lifetime in seconds")
                .env("GATEKEEP_ACCESS_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token lifetime in seconds")
                .env("GATEKEEP_REFRESH_TTL_SECONDS")
                .default_value("7776000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_DEFAULT_ROLE)
                .long(ARG_DEFAULT_ROLE)
                .help("Role embedded in tokens issued to every identity")
                .env("GATEKEEP_DEFAULT_ROLE")
                .default_value("user"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT)
                .long(ARG_PROVIDER_TIMEOUT)
                .help("Timeout for each call to an OAuth provider, in seconds")
                .env("GATEKEEP_PROVIDER_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}
