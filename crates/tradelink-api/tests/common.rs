#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use tradelink_api::{AppState, AppStateInner, build_router};
use tradelink_db::{Database, format_timestamp};
use tradelink_gateway::{Dispatcher, RelayScope};
use tradelink_types::models::Role;
use tradelink_types::token::issue_token;

pub const SECRET: &str = "integration-test-secret";

pub fn test_state(scope: RelayScope) -> AppState {
    AppStateInner::new(
        Database::open_in_memory().expect("in-memory db"),
        SECRET.to_string(),
        Duration::hours(1),
        Dispatcher::new(scope),
    )
}

pub fn test_app() -> (Router, AppState) {
    let state = test_state(RelayScope::Participants);
    (build_router(state.clone()), state)
}

/// Insert an account directly, skipping password hashing, and mint a token.
pub fn seed_account(state: &AppState, name: &str) -> (Uuid, String) {
    let id = Uuid::new_v4();
    let created = state
        .db
        .create_account(
            &id.to_string(),
            name,
            &format!("{}@example.com", name.to_lowercase()),
            "user",
            "unused",
            &format_timestamp(Utc::now()),
        )
        .expect("seed account");
    assert!(created, "seed email already taken");
    let token = issue_token(SECRET, id, Role::User, Duration::hours(1)).expect("token");
    (id, token)
}

pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub async fn send(app: &Router, token: &str, recipient: Uuid, content: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/api/v1/messages",
        Some(token),
        Some(serde_json::json!({ "recipientId": recipient.to_string(), "content": content })),
    )
    .await
}
