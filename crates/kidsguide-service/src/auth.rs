//! Authentication extractors.
//!
//! - `SessionAuth` - end-user access token from the `session` cookie or a
//!   bearer header
//! - `CronAuth` - shared secret on the cron trigger endpoints
//! - `ServiceAuth` - service-to-service API key
//! - `AdminAuth` - admin API key for privileged endpoints

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;

use kidsguide_core::{SessionId, UserId};

use crate::cookies::{cookie_value, SESSION_COOKIE};
use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn header_matches(parts: &Parts, header: &str, expected: Option<&String>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    parts
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| constant_time_eq(given, expected))
}

/// An authenticated end user.
#[derive(Debug, Clone, Copy)]
pub struct SessionAuth {
    /// The user ID.
    pub user_id: UserId,
    /// The session the access token belongs to.
    pub session_id: SessionId,
    /// Whether the session was confirmed in storage for this request.
    pub session_verified: bool,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie_value(&CookieJar::from_headers(&parts.headers), SESSION_COOKIE))
            .ok_or(ApiError::Unauthorized)?;

        let grant = state.tokens.validate_access(&token, state.now()).await?;

        Ok(SessionAuth {
            user_id: grant.user_id,
            session_id: grant.session_id,
            session_verified: grant.session_verified,
        })
    }
}

/// Caller of a cron trigger endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.cron_secret.as_deref().ok_or(ApiError::Unauthorized)?;
        let given = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(&given, expected) {
            tracing::warn!(path = %parts.uri.path(), "Rejected cron trigger with bad secret");
            return Err(ApiError::Unauthorized);
        }
        Ok(CronAuth)
    }
}

/// Service authentication via API key.
///
/// Used by the identity service to open sessions after it verified the
/// user's credentials.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if !header_matches(parts, "x-api-key", state.config.service_api_key.as_ref()) {
            return Err(ApiError::Unauthorized);
        }

        let service_name = parts
            .headers
            .get("x-service-name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(ServiceAuth { service_name })
    }
}

/// Admin authentication via the `X-Admin-Key` header.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if !header_matches(parts, "x-admin-key", state.config.admin_api_key.as_ref()) {
            return Err(ApiError::Unauthorized);
        }

        let admin_id = parts
            .headers
            .get("x-admin-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("admin")
            .to_string();

        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(AdminAuth { admin_id })
    }
}
