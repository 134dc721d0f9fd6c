use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};
use tower::ServiceExt;

use airlens::app::build_app;
use airlens::auth::resolver::MaybeUser;
use airlens::auth::store;
use airlens::config::{AppConfig, DatabaseConfig, IdpConfig, TokenConfig};
use airlens::state::AppState;

async fn test_state() -> AppState {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let config = Arc::new(AppConfig {
        database: DatabaseConfig {
            url: None,
            sqlite_path: std::env::temp_dir().join(format!("airlens-flow-{suffix}.db")),
        },
        token: TokenConfig {
            secret: "integration-test-secret".into(),
            ttl_days: 7,
        },
        idp: IdpConfig::default(),
    });
    AppState::from_config(config).await.expect("app state")
}

async fn test_app() -> Router {
    build_app(test_state().await)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::http::Response<axum::body::Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_login_resolve_favorites_flow() {
    let app = test_app().await;

    // Register.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({ "email": "alice@example.com", "password": "secret123", "name": "Alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let registered = body_json(response).await;
    assert_eq!(registered["token_type"], "bearer");
    assert_eq!(registered["user"]["email"], "alice@example.com");
    let registered_id = registered["user"]["id"].as_i64().expect("numeric id");

    // Login with the same credentials.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": "secret123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let logged_in = body_json(response).await;
    let token = logged_in["access_token"].as_str().expect("token").to_owned();
    assert!(!token.is_empty());

    // The token resolves back to the registered user.
    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/api/auth/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["id"].as_i64(), Some(registered_id));
    assert_eq!(profile["email"], "alice@example.com");
    assert_eq!(profile["name"], "Alice");

    // Add a favorite, then add it again.
    let response = app
        .clone()
        .oneshot(with_bearer("POST", "/api/favorites/Pune", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(with_bearer("POST", "/api/favorites/Pune", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/api/favorites", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let favorites = body_json(response).await;
    assert_eq!(favorites["favorites"].as_array().unwrap().len(), 1);
    assert_eq!(favorites["favorites"][0]["city"], "Pune");

    // Remove it; removing again is still a success.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(with_bearer("DELETE", "/api/favorites/Pune", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/api/favorites", &token))
        .await
        .unwrap();
    let favorites = body_json(response).await;
    assert!(favorites["favorites"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = test_app().await;
    let payload = json!({ "email": "alice@example.com", "password": "secret123", "name": "Alice" });

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/register", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/register", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Email already registered");
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/register",
            json!({ "email": "alice@example.com", "password": "secret123", "name": "Alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Incorrect email or password");
}

#[tokio::test]
async fn malformed_email_is_rejected() {
    let app = test_app().await;
    let response = app
        .oneshot(post_json(
            "/api/auth/register",
            json!({ "email": "not-an-email", "password": "secret123", "name": "Nobody" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn optional_auth_yields_no_user_instead_of_an_error() {
    let state = test_state().await;
    // A route shaped like the endpoints that work with or without auth.
    let app = Router::new()
        .route(
            "/whoami",
            axum::routing::get(|MaybeUser(user): MaybeUser| async move {
                axum::Json(json!({ "email": user.map(|u| u.email) }))
            }),
        )
        .with_state(state.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], Value::Null);

    let response = app
        .clone()
        .oneshot(with_bearer("GET", "/whoami", "garbage-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], Value::Null);

    store::create_user(&state.db, "alice@example.com", "Alice", "secret123")
        .await
        .expect("create user");
    let token = state.tokens.issue("alice@example.com").expect("issue");
    let response = app
        .oneshot(with_bearer("GET", "/whoami", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "alice@example.com");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(with_bearer("GET", "/api/favorites", "garbage-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Could not validate credentials");
}
