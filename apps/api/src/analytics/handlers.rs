use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{AnalyticsSnapshot, FeatureUsage};
use crate::errors::AppError;
use crate::models::user::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub name: String,
    #[serde(default)]
    pub properties: Option<Value>,
    /// Client clock, milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub properties: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEvent {
    pub feature: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl TrackResponse {
    fn ok() -> Self {
        Self {
            success: true,
            event_id: None,
        }
    }

    fn rejected(rejection: JsonRejection) -> Self {
        warn!(target: "analytics", "Discarding malformed analytics payload: {}", rejection.body_text());
        Self {
            success: false,
            event_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub total_users: i64,
    #[serde(flatten)]
    pub counters: AnalyticsSnapshot,
}

/// POST /api/analytics
///
/// Never fails: a malformed body is answered with `{success: false}`.
pub async fn handle_track_event(
    State(state): State<AppState>,
    payload: Result<Json<AnalyticsEvent>, JsonRejection>,
) -> Json<TrackResponse> {
    let Json(event) = match payload {
        Ok(event) => event,
        Err(rejection) => return Json(TrackResponse::rejected(rejection)),
    };

    let properties = event.properties.unwrap_or(serde_json::Value::Null);
    let client_time = event
        .timestamp
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.to_rfc3339());
    info!(
        target: "analytics",
        name = %event.name,
        session_id = event.session_id.as_deref().unwrap_or(""),
        user_id = event.user_id.as_deref().unwrap_or(""),
        timestamp = client_time.as_deref().unwrap_or(""),
        properties = %properties,
        "Analytics event"
    );
    state.analytics.record_event(&event.name);

    Json(TrackResponse {
        success: true,
        event_id: Some(format!("event_{}", Utc::now().timestamp_millis())),
    })
}

/// POST /api/analytics/conversion
pub async fn handle_track_conversion(
    State(state): State<AppState>,
    payload: Result<Json<ConversionEvent>, JsonRejection>,
) -> Json<TrackResponse> {
    let Json(event) = match payload {
        Ok(event) => event,
        Err(rejection) => return Json(TrackResponse::rejected(rejection)),
    };

    let properties = event.properties.unwrap_or(serde_json::Value::Null);
    info!(
        target: "analytics",
        kind = %event.kind,
        session_id = event.session_id.as_deref().unwrap_or(""),
        user_id = event.user_id.as_deref().unwrap_or(""),
        properties = %properties,
        "Conversion event"
    );
    state.analytics.record_conversion(&event.kind);
    Json(TrackResponse::ok())
}

/// POST /api/analytics/feature
pub async fn handle_track_feature(
    State(state): State<AppState>,
    payload: Result<Json<FeatureEvent>, JsonRejection>,
) -> Json<TrackResponse> {
    let Json(event) = match payload {
        Ok(event) => event,
        Err(rejection) => return Json(TrackResponse::rejected(rejection)),
    };

    let details = event.details.unwrap_or(serde_json::Value::Null);
    info!(
        target: "analytics",
        feature = %event.feature,
        session_id = event.session_id.as_deref().unwrap_or(""),
        user_id = event.user_id.as_deref().unwrap_or(""),
        details = %details,
        "Feature usage"
    );
    state.analytics.record_feature(&event.feature);
    Json(TrackResponse::ok())
}

/// GET /api/analytics/dashboard
pub async fn handle_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, AppError> {
    let total_users = User::count(&state.db).await?;
    Ok(Json(DashboardResponse {
        total_users,
        counters: state.analytics.snapshot(),
    }))
}

/// GET /api/analytics/features/popular
pub async fn handle_popular_features(State(state): State<AppState>) -> Json<Vec<FeatureUsage>> {
    Json(state.analytics.popular_features())
}
