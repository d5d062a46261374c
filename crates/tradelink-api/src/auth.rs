use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tradelink_db::format_timestamp;
use tradelink_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use tradelink_types::models::Role;
use tradelink_types::token::issue_token;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::InvalidArgument(
            "Email, password, and name are required".into(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::InvalidArgument("Name is too long".into()));
    }
    if !email.contains('@') {
        return Err(ApiError::InvalidArgument("Invalid email address".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::InvalidArgument(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let role = Role::from_requested(req.role.as_deref());
    let account_id = Uuid::new_v4();
    let password = req.password;
    let email_for_insert = email.clone();

    let created = run_blocking(&state, move |db| {
        if db.get_account_by_email(&email_for_insert)?.is_some() {
            return Ok(false);
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        // A concurrent registration can still win between the check and here
        db.create_account(
            &account_id.to_string(),
            &name,
            &email_for_insert,
            role.as_str(),
            &password_hash,
            &format_timestamp(Utc::now()),
        )
    })
    .await?;

    if !created {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let token = issue_token(&state.jwt_secret, account_id, role, state.token_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;

    info!("Registered {} account {} ({})", role, account_id, email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            account_id,
            role,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let account = run_blocking(&state, move |db| {
        let Some(row) = db.get_account_by_email(&email)? else {
            return Ok(None);
        };

        let parsed_hash = PasswordHash::new(&row.password_hash)
            .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", row.id, e))?;
        let verified = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();

        Ok(verified.then_some(row))
    })
    .await?
    .ok_or_else(|| ApiError::Unauthenticated("Invalid email or password".into()))?;

    let profile = account.to_profile()?;
    let token = issue_token(&state.jwt_secret, profile.id, profile.role, state.token_ttl)
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(LoginResponse {
        account_id: profile.id,
        name: profile.name,
        role: profile.role,
        token,
    }))
}
