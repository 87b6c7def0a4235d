use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{
    analyses_today, daily_matches, is_unlimited, unlimited_matches, DailyMatches, Plan,
    STATUS_ACTIVE, STATUS_CANCELLED,
};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::AppJson;
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub subscription_id: String,
    pub plan: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub subscription_status: String,
    pub subscription_plan: String,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub message: String,
    pub user: SubscribedUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub subscription_status: String,
    pub subscription_plan: String,
    pub subscription_start_date: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub plan: String,
    pub daily_matches: DailyMatches,
}

async fn load_user(state: &AppState, auth: &AuthUser) -> Result<User, AppError> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))
}

/// POST /api/subscriptions/activate
///
/// The subscription id comes from the client after checkout approval and is
/// stored as reported.
pub async fn handle_activate(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(req): AppJson<ActivateRequest>,
) -> Result<Json<ActivateResponse>, AppError> {
    let plan: Plan = req.plan.parse()?;
    if req.subscription_id.trim().is_empty() {
        return Err(AppError::Validation("subscription_id is required".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET subscription_status = $2,
            subscription_plan = $3,
            subscription_id = $4,
            subscription_start_date = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(STATUS_ACTIVE)
    .bind(plan.as_str())
    .bind(&req.subscription_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    info!(
        target: "analytics",
        user_id = %user.id,
        email = %auth.email,
        plan = plan.as_str(),
        subscription_id = %req.subscription_id,
        amount = plan.amount(),
        "subscription_activated"
    );

    Ok(Json(ActivateResponse {
        success: true,
        message: "Subscription activated successfully".to_string(),
        user: SubscribedUser {
            id: user.id,
            email: user.email,
            name: user.name,
            subscription_status: user.subscription_status,
            subscription_plan: user.subscription_plan,
        },
    }))
}

/// GET /api/subscriptions/status
pub async fn handle_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<StatusResponse>, AppError> {
    let user = load_user(&state, &auth).await?;
    Ok(Json(StatusResponse {
        subscription_status: user.subscription_status,
        subscription_plan: user.subscription_plan,
        subscription_start_date: user.subscription_start_date,
        subscription_id: user.subscription_id,
    }))
}

/// POST /api/subscriptions/cancel
///
/// The plan is left in place until the billing period would end.
pub async fn handle_cancel(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CancelResponse>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET subscription_status = $2 WHERE id = $1 RETURNING *",
    )
    .bind(auth.user_id)
    .bind(STATUS_CANCELLED)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    info!(
        target: "analytics",
        user_id = %user.id,
        email = %auth.email,
        subscription_id = user.subscription_id.as_deref().unwrap_or(""),
        "subscription_cancelled"
    );

    Ok(Json(CancelResponse {
        success: true,
        message: "Subscription cancelled successfully".to_string(),
    }))
}

/// GET /api/subscriptions/usage
pub async fn handle_usage(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UsageResponse>, AppError> {
    let user = load_user(&state, &auth).await?;
    if is_unlimited(&user) {
        return Ok(Json(UsageResponse {
            plan: user.subscription_plan,
            daily_matches: unlimited_matches(),
        }));
    }

    let used = analyses_today(&state.db, user.id, Utc::now()).await?;
    Ok(Json(UsageResponse {
        plan: Plan::Free.as_str().to_string(),
        daily_matches: daily_matches(used, state.config.free_daily_analyses),
    }))
}
