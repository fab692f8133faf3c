//! Provider registry, built once at startup and shared read-only.

use secrecy::SecretString;
use std::{collections::HashMap, fmt, str::FromStr};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_PROFILE_URL: &str = "https://api.github.com/user";
pub const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/oauth/access_token";
pub const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/me?fields=id,name,email,picture";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    GitHub,
    Facebook,
}

impl ProviderKind {
    pub const ALL: [Self; 3] = [Self::Google, Self::GitHub, Self::Facebook];

    /// Name recorded on linked identities.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::GitHub => "GitHub",
            Self::Facebook => "Facebook",
        }
    }

    /// Lowercase path segment, e.g. `/oauth/github/callback`.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
            Self::Facebook => "facebook",
        }
    }

    fn default_token_url(self) -> &'static str {
        match self {
            Self::Google => GOOGLE_TOKEN_URL,
            Self::GitHub => GITHUB_TOKEN_URL,
            Self::Facebook => FACEBOOK_TOKEN_URL,
        }
    }

    fn default_profile_url(self) -> &'static str {
        match self {
            Self::Google => GOOGLE_PROFILE_URL,
            Self::GitHub => GITHUB_PROFILE_URL,
            Self::Facebook => FACEBOOK_PROFILE_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown provider: {value}"))
    }
}

/// Client registration and endpoints of one provider.
#[derive(Clone)]
pub struct ProviderConfig {
    kind: ProviderKind,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    token_url: String,
    profile_url: String,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(
        kind: ProviderKind,
        client_id: String,
        client_secret: SecretString,
        redirect_uri: String,
    ) -> Self {
        Self {
            kind,
            client_id,
            client_secret,
            redirect_uri,
            token_url: kind.default_token_url().to_string(),
            profile_url: kind.default_profile_url().to_string(),
        }
    }

    #[must_use]
    pub fn with_token_url(mut self, url: String) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_profile_url(mut self, url: String) -> Self {
        self.profile_url = url;
        self
    }

    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    #[must_use]
    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .finish()
    }
}

/// Enabled providers. A provider without a client id is simply absent.
#[derive(Clone, Debug, Default)]
pub struct Providers {
    entries: HashMap<ProviderKind, ProviderConfig>,
}

impl Providers {
    #[must_use]
    pub fn new(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        Self {
            entries: configs
                .into_iter()
                .filter(|config| !config.client_id.trim().is_empty())
                .map(|config| (config.kind, config))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.entries.get(&kind)
    }

    /// Enabled kinds in a stable order.
    #[must_use]
    pub fn enabled(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.entries.contains_key(kind))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
