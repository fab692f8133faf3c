//! HTTP surface tests: drive the full router (middleware and layers included)
//! with `oneshot` requests.

use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use gatekeep::{
    api,
    session::{
        password::Argon2Hasher, revocation::MemoryRevocationCache, store::MemoryStore,
        SessionConfig, SessionService, TokenPair,
    },
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "an-hs256-key-that-is-long-enough!";

fn app() -> Result<Router> {
    let params = argon2::Params::new(8, 1, 1, None).map_err(|err| anyhow!("params: {err}"))?;
    let service = SessionService::new(
        SessionConfig::new(SecretString::from(KEY.to_string())),
        Arc::new(MemoryStore::new()),
        Arc::new(Argon2Hasher::with_params(params)),
        Arc::new(MemoryRevocationCache::new()),
    )?;
    Ok(api::router(Arc::new(service)))
}

fn json_request(method: Method, uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?)
}

fn bearer_request(method: Method, uri: &str, token: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())?)
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

async fn register_and_login(app: &Router) -> Result<TokenPair> {
    let (status, _) = send(
        app,
        json_request(
            Method::POST,
            "/auth/register",
            &json!({"name": "Alice", "email": "alice@x.com", "password": "password123"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/auth/login",
            &json!({"email": "alice@x.com", "password": "password123"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(serde_json::from_value(body)?)
}

#[tokio::test]
async fn register_then_duplicate() -> Result<()> {
    let app = app()?;
    let payload = json!({"name": "Alice", "email": "alice@x.com", "password": "password123"});

    let (status, body) = send(&app, json_request(Method::POST, "/auth/register", &payload)?).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"message": "User registered successfully"}));

    let (status, body) = send(&app, json_request(Method::POST, "/auth/register", &payload)?).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"error": "email already exists"}));
    Ok(())
}

#[tokio::test]
async fn register_validation_errors_are_bad_request() -> Result<()> {
    let app = app()?;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/register",
            &json!({"name": "Alice", "email": "nope", "password": "password123"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "invalid email"}));
    Ok(())
}

#[tokio::test]
async fn login_statuses() -> Result<()> {
    let app = app()?;
    let pair = register_and_login(&app).await?;
    assert!(pair.access_token.starts_with("Bearer "));

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            &json!({"email": "alice@x.com", "password": "wrongpass"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "wrong password"}));

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            &json!({"email": "nobody@x.com", "password": "password123"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let app = app()?;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/user/profile")
        .body(Body::empty())?;
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "missing authorization header"}));

    let (status, body) = send(
        &app,
        bearer_request(Method::GET, "/user/profile", "Bearer not.a.token")?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "invalid token"}));
    Ok(())
}

#[tokio::test]
async fn profile_logout_and_revocation() -> Result<()> {
    let app = app()?;
    let pair = register_and_login(&app).await?;

    let (status, body) = send(
        &app,
        bearer_request(Method::GET, "/user/profile", &pair.access_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@x.com");
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["provider"], Value::Null);

    let (status, body) = send(
        &app,
        bearer_request(Method::POST, "/user/logout", &pair.access_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "logout successful"}));

    let (status, body) = send(
        &app,
        bearer_request(Method::GET, "/user/profile", &pair.access_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "token has been revoked"}));

    // The session is gone, so the refresh token no longer works either.
    let (status, _) = send(
        &app,
        bearer_request(Method::POST, "/auth/refresh", &pair.refresh_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() -> Result<()> {
    let app = app()?;
    let pair = register_and_login(&app).await?;

    let (status, body) = send(
        &app,
        bearer_request(Method::POST, "/auth/refresh", &pair.refresh_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let rotated: TokenPair = serde_json::from_value(body)?;
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    let (status, body) = send(
        &app,
        bearer_request(Method::POST, "/auth/refresh", &pair.refresh_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "refresh token mismatch"}));

    // An access token cannot refresh.
    let (status, _) = send(
        &app,
        bearer_request(Method::POST, "/auth/refresh", &rotated.access_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn delete_account_endpoint() -> Result<()> {
    let app = app()?;
    let pair = register_and_login(&app).await?;

    let (status, body) = send(
        &app,
        bearer_request(Method::DELETE, "/user/delete", &pair.access_token)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "account deleted successfully"}));

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            &json!({"email": "alice@x.com", "password": "password123"}),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn oauth_callback_errors() -> Result<()> {
    let app = app()?;

    let request = Request::builder()
        .uri("/oauth/myspace/callback?code=abc")
        .body(Body::empty())?;
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "unknown provider: myspace"}));

    let request = Request::builder()
        .uri("/oauth/google/callback")
        .body(Body::empty())?;
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "missing code"}));

    let request = Request::builder()
        .uri("/oauth/google/callback?error=access_denied")
        .body(Body::empty())?;
    let (status, _) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    // No providers are configured in this app.
    let request = Request::builder()
        .uri("/oauth/github/callback?code=abc")
        .body(Body::empty())?;
    let (status, body) = send(&app, request).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "provider github is not configured"}));
    Ok(())
}

#[tokio::test]
async fn health_and_request_ids() -> Result<()> {
    let app = app()?;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("x-request-id missing"))?;
    assert_eq!(request_id.len(), 26, "expected a ULID, got {request_id}");
    assert!(response.headers().contains_key("x-app"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["store"], "ok");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "caller-supplied")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("caller-supplied")
    );

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::HEAD)
                .uri("/health")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
