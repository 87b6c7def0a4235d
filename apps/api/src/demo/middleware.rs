use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::info;

use crate::auth::MaybeAuthUser;
use crate::demo::rate_limit::DemoQuota;
use crate::errors::AppError;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

/// Session id sent by the demo client, if any.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First hop of `x-forwarded-for`, when a proxy set it.
pub fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// First `x-forwarded-for` hop, else the peer address, else `"unknown"`.
pub fn client_ip(request: &Request) -> String {
    if let Some(ip) = forwarded_for(request.headers()) {
        return ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Throttles anonymous demo analyses. Signed-in callers pass straight through.
pub async fn demo_rate_limit(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if user.is_some() {
        return Ok(next.run(request).await);
    }

    let session = session_id(request.headers())
        .ok_or(AppError::SessionRequired)?
        .to_string();
    let ip = client_ip(&request);

    let quota = state
        .demo_limiter
        .check_and_record(&session, &ip, Utc::now())
        .inspect_err(|e| info!(session = %session, ip = %ip, "Demo request throttled: {}", e.code()))?;

    let mut response = next.run(request).await;
    apply_quota_headers(response.headers_mut(), &quota);
    Ok(response)
}

pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &DemoQuota) {
    let pairs = [
        ("x-ratelimit-session-limit", quota.session_limit),
        ("x-ratelimit-session-remaining", quota.session_remaining),
        ("x-ratelimit-ip-limit", quota.ip_limit),
        ("x-ratelimit-ip-remaining", quota.ip_remaining),
    ];
    for (name, value) in pairs {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
}
