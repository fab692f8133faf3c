//! Provider HTTP calls: authorization-code exchange and profile fetch.

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::config::{ProviderConfig, ProviderKind};
use crate::session::error::AuthError;

#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Trade an authorization code for the provider's access token.
    async fn exchange_code(&self, provider: &ProviderConfig, code: &str)
        -> Result<String, AuthError>;

    /// Fetch the raw profile document for `access_token`.
    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<Value, AuthError>;
}

/// reqwest-backed client; every request is bounded by the configured timeout.
#[derive(Clone, Debug)]
pub struct HttpOAuthClient {
    client: Client,
}

impl HttpOAuthClient {
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Internal(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OAuthClient for HttpOAuthClient {
    #[instrument(skip(self, provider, code), fields(provider = %provider.kind()))]
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
    ) -> Result<String, AuthError> {
        let form = [
            ("client_id", provider.client_id()),
            ("client_secret", provider.client_secret().expose_secret()),
            ("code", code),
            ("redirect_uri", provider.redirect_uri()),
            ("grant_type", "authorization_code"),
        ];

        // GitHub answers form-encoded unless asked for JSON.
        let response = self
            .client
            .post(provider.token_url())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|err| exchange_failed(provider.kind(), &err))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|err| exchange_failed(provider.kind(), &err))?;

        if !status.is_success() {
            return Err(AuthError::external(format!(
                "{} token exchange failed: {status}, {}",
                provider.kind(),
                provider_error_message(&body)
            )));
        }

        // Some providers report errors with a 200 and an `error` field.
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::external(format!(
                    "{} token exchange failed: {}",
                    provider.kind(),
                    provider_error_message(&body)
                ))
            })?;

        debug!("authorization code exchanged");
        Ok(token.to_string())
    }

    #[instrument(skip(self, provider, access_token), fields(provider = %provider.kind()))]
    async fn fetch_profile(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> Result<Value, AuthError> {
        let request = self.client.get(provider.profile_url());
        let request = match provider.kind() {
            ProviderKind::Facebook => request.query(&[("access_token", access_token)]),
            ProviderKind::Google | ProviderKind::GitHub => request.bearer_auth(access_token),
        };

        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| profile_failed(provider.kind(), &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::external(format!(
                "{} profile fetch failed: {status}",
                provider.kind()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| profile_failed(provider.kind(), &err))
    }
}

fn exchange_failed(kind: ProviderKind, err: &reqwest::Error) -> AuthError {
    AuthError::external(format!("{kind} token exchange failed: {err}"))
}

fn profile_failed(kind: ProviderKind, err: &reqwest::Error) -> AuthError {
    AuthError::external(format!("{kind} profile fetch failed: {err}"))
}

fn provider_error_message(body: &Value) -> String {
    let field = |name: &str| body.get(name).and_then(Value::as_str);
    match (field("error"), field("error_description")) {
        (Some(error), Some(description)) => format!("{error}: {description}"),
        (Some(error), None) => error.to_string(),
        (None, Some(description)) => description.to_string(),
        // Facebook nests its errors.
        (None, None) => body
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("no access token in response")
            .to_string(),
    }
}
