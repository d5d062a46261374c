use axum::{
    Json, Router, middleware,
    routing::{get, patch, post},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{accounts, auth, messages, relay};

/// Assemble every route. Transport layers (CORS, tracing) are added by the
/// binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/v1/accounts/me", get(accounts::me))
        .route("/api/v1/accounts/{account_id}", get(accounts::get_account))
        .route(
            "/api/v1/messages",
            post(messages::send_message).get(messages::list_conversations),
        )
        .route(
            "/api/v1/messages/conversation/{user_id}",
            get(messages::get_conversation),
        )
        .route(
            "/api/v1/messages/{message_id}/read",
            patch(messages::mark_read),
        )
        .route(
            "/api/v1/messages/{message_id}",
            axum::routing::delete(messages::delete_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let relay_route = Router::new().route("/gateway", get(relay::relay_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(relay_route)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
