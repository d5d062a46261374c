use axum::{
    extract::{Query, State, WebSocketUpgrade, rejection::QueryRejection},
    response::IntoResponse,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use serde::Deserialize;
use tracing::warn;

use tradelink_gateway::connection;
use tradelink_types::token::verify_token;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    /// Browsers cannot set headers on a WebSocket handshake
    pub token: Option<String>,
}

/// GET /gateway — authenticate, then upgrade to the relay connection.
/// A missing or invalid token is refused before the upgrade happens.
pub async fn relay_upgrade(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    query: Result<Query<RelayQuery>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let token = match (&bearer, query.token.as_deref()) {
        (Ok(TypedHeader(Authorization(bearer))), _) => bearer.token().to_string(),
        (Err(_), Some(token)) => token.to_string(),
        (Err(_), None) => {
            warn!("Relay handshake rejected: no token");
            return Err(ApiError::Unauthenticated("Authentication error".into()));
        }
    };

    let claims = verify_token(&state.jwt_secret, &token).map_err(|e| {
        warn!("Relay handshake rejected: {}", e);
        ApiError::Unauthenticated("Authentication error".into())
    })?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, claims.sub)))
}
