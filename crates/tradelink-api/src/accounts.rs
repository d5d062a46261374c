use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use tradelink_types::models::AccountProfile;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Claims;
use crate::state::{AppState, run_blocking};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    lookup(&state, claims.sub).await
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let account_id: Uuid = account_id
        .parse()
        .map_err(|_| ApiError::InvalidArgument("Invalid user ID".into()))?;
    lookup(&state, account_id).await
}

async fn lookup(state: &AppState, account_id: Uuid) -> ApiResult<Json<AccountProfile>> {
    let row = run_blocking(state, move |db| db.get_account_by_id(&account_id.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(row.to_profile()?))
}
