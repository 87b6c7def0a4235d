use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::AuthUser;
use crate::db::is_unique_violation;
use crate::errors::AppError;
use crate::extract::AppJson;
use crate::models::user::{User, UserSummary};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserSummary,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: CurrentUser,
}

/// POST /api/auth/signup
pub async fn handle_signup(
    State(state): State<AppState>,
    AppJson(req): AppJson<SignupRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(format!("Invalid input: {e}")))?;
    let email = req.email.trim().to_lowercase();

    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Validation("User already exists".to_string()));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = User::create(&state.db, &email, &password_hash, name)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("User already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

    info!(user_id = %user.id, "User signed up");
    auth_response(&state, &user)
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::Validation(format!("Invalid input: {e}")))?;
    let email = req.email.trim().to_lowercase();

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    if !valid {
        return Err(invalid());
    }

    info!(user_id = %user.id, "User logged in");
    auth_response(&state, &user)
}

/// GET /api/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(Json(MeResponse {
        user: CurrentUser {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        },
    }))
}

fn auth_response(state: &AppState, user: &User) -> Result<Json<AuthResponse>, AppError> {
    let token = state
        .jwt
        .issue(user.id, &user.email)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token signing failed: {e}")))?;
    Ok(Json(AuthResponse {
        user: UserSummary::from(user),
        token,
    }))
}
