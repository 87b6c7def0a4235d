pub mod handlers;

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::User;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_CANCELLED: &str = "CANCELLED";

/// Daily limit reported for unlimited plans.
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    ProMonthly,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::ProMonthly => "pro_monthly",
        }
    }

    /// Monthly price in USD, as reported on activation events.
    pub fn amount(&self) -> u32 {
        match self {
            Plan::Free => 0,
            Plan::ProMonthly => 10,
        }
    }
}

impl FromStr for Plan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "pro_monthly" => Ok(Plan::ProMonthly),
            other => Err(AppError::Validation(format!("Unknown plan: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyMatches {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
}

/// Active subscribers on anything but the free plan are unmetered.
pub fn is_unlimited(user: &User) -> bool {
    user.subscription_status == STATUS_ACTIVE && user.subscription_plan != Plan::Free.as_str()
}

pub fn daily_matches(used: i64, limit: i64) -> DailyMatches {
    DailyMatches {
        used,
        limit,
        remaining: (limit - used).max(0),
    }
}

pub fn unlimited_matches() -> DailyMatches {
    DailyMatches {
        used: 0,
        limit: UNLIMITED,
        remaining: UNLIMITED,
    }
}

/// `[start, end)` of the UTC day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

pub async fn analyses_today(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> Result<i64, sqlx::Error> {
    let (start, end) = utc_day_bounds(now);
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM analyses WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await
}

/// Rejects a new analysis once a metered user has used up today's allowance.
pub async fn ensure_analysis_allowed(
    pool: &PgPool,
    user_id: Uuid,
    free_limit: i64,
) -> Result<(), AppError> {
    let user = User::find_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;
    if is_unlimited(&user) {
        return Ok(());
    }

    let used = analyses_today(pool, user_id, Utc::now()).await?;
    if used >= free_limit {
        return Err(AppError::UsageLimit { limit: free_limit });
    }
    Ok(())
}
