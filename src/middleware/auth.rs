//! Auth extractors: bearer identity for users and admins; app key for backends.

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::Identity;

const HEADER_APP_KEY: &str = "x-app-key";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix(BEARER_PREFIX))
        .filter(|t| !t.is_empty())
}

/// Header first, then `?token=` (browser `EventSource` cannot set headers).
fn request_token(parts: &Parts) -> Option<String> {
    if let Some(token) = bearer_token(&parts.headers) {
        return Some(token.to_string());
    }
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Extractor: authenticated identity from a bearer token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(parts).ok_or(AppError::Unauthorized)?;
        let identity = state.jwt_secret().validate(&token).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            AppError::Unauthorized
        })?;
        Ok(AuthUser(identity))
    }
}

/// Extractor: authenticated identity holding the admin role.
#[derive(Clone, Debug)]
pub struct AdminUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        if !identity.role.is_admin() {
            debug!(user_id = %identity.user_id, role = %identity.role, "admin role required");
            return Err(AppError::Unauthorized);
        }
        Ok(AdminUser(identity))
    }
}

/// Require the `x-app-key` header that backend processes send when publishing.
pub fn require_app_key(headers: &HeaderMap, app_key: &str) -> Result<(), AppError> {
    let key = headers
        .get(HEADER_APP_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if key.is_empty() || key != app_key {
        debug!("rejected request: invalid or missing x-app-key");
        return Err(AppError::Auth("invalid or missing x-app-key".to_string()));
    }
    Ok(())
}
