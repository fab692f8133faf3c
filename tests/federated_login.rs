//! Federated login against mocked provider endpoints.

use anyhow::{anyhow, Context, Result};
use gatekeep::{
    oauth::{FederatedReconciler, HttpOAuthClient, ProviderConfig, ProviderKind, Providers},
    session::{
        password::Argon2Hasher,
        revocation::MemoryRevocationCache,
        store::{IdentityStore, MemoryStore},
        AuthError, SessionConfig, SessionService,
    },
};
use secrecy::SecretString;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const KEY: &str = "an-hs256-key-that-is-long-enough!";

fn provider(server: &MockServer, kind: ProviderKind) -> ProviderConfig {
    let slug = kind.slug();
    ProviderConfig::new(
        kind,
        format!("{slug}-client"),
        SecretString::from(format!("{slug}-secret")),
        format!("https://app.test/oauth/{slug}/callback"),
    )
    .with_token_url(format!("{}/{slug}/token", server.uri()))
    .with_profile_url(format!("{}/{slug}/profile", server.uri()))
}

fn service(server: &MockServer, kinds: &[ProviderKind]) -> Result<(SessionService, MemoryStore)> {
    let store = MemoryStore::new();
    let params = argon2::Params::new(8, 1, 1, None).map_err(|err| anyhow!("params: {err}"))?;
    let providers = Providers::new(kinds.iter().map(|kind| provider(server, *kind)));
    let client = HttpOAuthClient::new(Duration::from_secs(5))?;

    let service = SessionService::new(
        SessionConfig::new(SecretString::from(KEY.to_string())),
        Arc::new(store.clone()),
        Arc::new(Argon2Hasher::with_params(params)),
        Arc::new(MemoryRevocationCache::new()),
    )?
    .with_federation(FederatedReconciler::new(
        Arc::new(providers),
        Arc::new(client),
    ));
    Ok((service, store))
}

async fn mock_token(server: &MockServer, kind: ProviderKind, code: &str, token: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/token", kind.slug())))
        .and(body_string_contains(format!("code={code}")))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

async fn mock_bearer_profile(
    server: &MockServer,
    kind: ProviderKind,
    token: &str,
    profile: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/profile", kind.slug())))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile))
        .mount(server)
        .await;
}

#[tokio::test]
async fn google_login_creates_identity_without_password() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Google, "g-code", "g-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::Google,
        "g-token",
        json!({
            "id": "1098",
            "email": "bob@x.com",
            "verified_email": true,
            "name": "Bob",
            "picture": "https://img.test/bob.png"
        }),
    )
    .await;

    let (service, store) = service(&server, &[ProviderKind::Google])?;
    let pair = service.federated_login(ProviderKind::Google, "g-code").await?;

    let identity = store
        .find_identity_by_email("bob@x.com")
        .await?
        .context("identity should be created")?;
    assert_eq!(identity.name, "Bob");
    assert_eq!(identity.provider.as_deref(), Some("Google"));
    assert_eq!(identity.provider_subject_id.as_deref(), Some("1098"));
    assert_eq!(identity.password_hash, None);

    let principal = service.authorize(pair.access()).await?;
    assert_eq!(principal.identity_id, identity.id);
    assert_eq!(store.session_count().await, 1);

    // No password to log in with.
    let password_login = service.login("bob@x.com", "password123").await;
    assert!(matches!(password_login, Err(AuthError::Authentication(_))));
    Ok(())
}

#[tokio::test]
async fn latest_provider_wins_for_the_same_email() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Google, "g-code", "g-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::Google,
        "g-token",
        json!({"id": "1098", "email": "bob@x.com", "verified_email": true, "name": "Bob"}),
    )
    .await;
    mock_token(&server, ProviderKind::GitHub, "gh-code", "gh-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::GitHub,
        "gh-token",
        json!({"id": 4242, "login": "bobby", "name": null, "email": "Bob@X.com"}),
    )
    .await;

    let (service, store) = service(&server, &[ProviderKind::Google, ProviderKind::GitHub])?;
    let first = service.federated_login(ProviderKind::Google, "g-code").await?;
    let second = service.federated_login(ProviderKind::GitHub, "gh-code").await?;

    assert_eq!(store.identity_count().await, 1);
    assert_eq!(store.session_count().await, 1);

    let identity = store
        .find_identity_by_email("bob@x.com")
        .await?
        .context("identity should exist")?;
    assert_eq!(identity.provider.as_deref(), Some("GitHub"));
    assert_eq!(identity.provider_subject_id.as_deref(), Some("4242"));
    // Linking keeps the name chosen at creation.
    assert_eq!(identity.name, "Bob");

    let superseded = service.refresh(identity.id, first.refresh()).await;
    assert!(
        matches!(&superseded, Err(AuthError::Authentication(msg)) if msg == "refresh token mismatch"),
        "{superseded:?}"
    );
    service.refresh(identity.id, second.refresh()).await?;
    Ok(())
}

#[tokio::test]
async fn provider_login_links_a_password_identity() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Google, "g-code", "g-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::Google,
        "g-token",
        json!({"id": "77", "email": "alice@x.com", "verified_email": true, "name": "Alice G"}),
    )
    .await;

    let (service, store) = service(&server, &[ProviderKind::Google])?;
    service
        .register("Alice", "alice@x.com", "password123")
        .await?;
    service.federated_login(ProviderKind::Google, "g-code").await?;

    assert_eq!(store.identity_count().await, 1);
    let identity = store
        .find_identity_by_email("alice@x.com")
        .await?
        .context("identity should exist")?;
    assert_eq!(identity.provider.as_deref(), Some("Google"));
    assert!(identity.password_hash.is_some());

    service.login("alice@x.com", "password123").await?;
    Ok(())
}

#[tokio::test]
async fn facebook_profile_uses_query_token() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Facebook, "fb-code", "fb-token").await;
    Mock::given(method("GET"))
        .and(path("/facebook/profile"))
        .and(query_param("access_token", "fb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "55",
            "name": "Carol",
            "email": "carol@x.com",
            "picture": {"data": {"url": "https://img.test/carol.png"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (service, store) = service(&server, &[ProviderKind::Facebook])?;
    service
        .federated_login(ProviderKind::Facebook, "fb-code")
        .await?;

    let identity = store
        .find_identity_by_email("carol@x.com")
        .await?
        .context("identity should be created")?;
    assert_eq!(identity.provider.as_deref(), Some("Facebook"));
    Ok(())
}

#[tokio::test]
async fn unverified_email_is_refused() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Google, "g-code", "g-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::Google,
        "g-token",
        json!({"id": "1", "email": "mallory@x.com", "verified_email": false}),
    )
    .await;

    let (service, store) = service(&server, &[ProviderKind::Google])?;
    let result = service.federated_login(ProviderKind::Google, "g-code").await;
    assert!(
        matches!(&result, Err(AuthError::ExternalProvider(msg)) if msg == "email not verified"),
        "{result:?}"
    );
    assert_eq!(store.identity_count().await, 0);
    assert_eq!(store.session_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn missing_email_is_refused() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::GitHub, "gh-code", "gh-token").await;
    mock_bearer_profile(
        &server,
        ProviderKind::GitHub,
        "gh-token",
        json!({"id": 9, "login": "ghost", "email": null}),
    )
    .await;

    let (service, store) = service(&server, &[ProviderKind::GitHub])?;
    let result = service.federated_login(ProviderKind::GitHub, "gh-code").await;
    assert!(
        matches!(&result, Err(AuthError::ExternalProvider(msg)) if msg == "email not available"),
        "{result:?}"
    );
    assert_eq!(store.identity_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn rejected_code_writes_nothing() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/google/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .mount(&server)
        .await;
    // The profile endpoint must never be reached.
    Mock::given(method("GET"))
        .and(path("/google/profile"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (service, store) = service(&server, &[ProviderKind::Google])?;
    let result = service.federated_login(ProviderKind::Google, "stale").await;
    match result {
        Err(AuthError::ExternalProvider(msg)) => assert!(msg.contains("invalid_grant"), "{msg}"),
        other => return Err(anyhow!("expected provider error, got {other:?}")),
    }
    assert_eq!(store.identity_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn profile_endpoint_failure_is_a_provider_error() -> Result<()> {
    let server = MockServer::start().await;
    mock_token(&server, ProviderKind::Google, "g-code", "g-token").await;
    Mock::given(method("GET"))
        .and(path("/google/profile"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (service, store) = service(&server, &[ProviderKind::Google])?;
    let result = service.federated_login(ProviderKind::Google, "g-code").await;
    assert!(matches!(result, Err(AuthError::ExternalProvider(_))));
    assert_eq!(store.identity_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn unconfigured_provider_is_not_found() -> Result<()> {
    let server = MockServer::start().await;
    let (service, _) = service(&server, &[ProviderKind::Google])?;

    let result = service.federated_login(ProviderKind::GitHub, "code").await;
    assert!(
        matches!(&result, Err(AuthError::NotFound(msg)) if msg == "provider github is not configured"),
        "{result:?}"
    );

    let empty_code = service.federated_login(ProviderKind::Google, "  ").await;
    assert!(matches!(empty_code, Err(AuthError::Validation(_))));
    Ok(())
}
