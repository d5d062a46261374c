use std::sync::Arc;

use anyhow::anyhow;
use chrono::Duration;
use tracing::error;

use tradelink_db::Database;
use tradelink_gateway::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, token_ttl: Duration, dispatcher: Dispatcher) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret,
            token_ttl,
            dispatcher,
        })
    }
}

/// Run blocking SQLite work off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::Internal)
}
