//! Bearer-token authentication: JWT issue/verify, password hashing, and the
//! extractors handlers use to learn who is calling.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

pub mod handlers;
pub mod jwt;
pub mod password;

pub use jwt::JwtKeys;

/// An authenticated caller, taken from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub(crate) fn authenticate(headers: &HeaderMap, keys: &JwtKeys) -> Result<AuthUser, AppError> {
    let token =
        bearer_token(headers).ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;
    let claims = keys.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        AppError::Unauthorized("Invalid token".into())
    })?;
    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authenticate(&parts.headers, &state.jwt)
    }
}

/// The caller when a valid bearer token is present; `None` otherwise.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Infallible> {
        Ok(MaybeAuthUser(authenticate(&parts.headers, &state.jwt).ok()))
    }
}
