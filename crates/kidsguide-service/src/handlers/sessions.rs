//! Login session handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use kidsguide_core::{SessionId, SessionState, UserId};

use crate::auth::{bearer_token, ServiceAuth, SessionAuth};
use crate::cookies::{clear_session_cookies, cookie_value, token_cookie, REFRESH_COOKIE, SESSION_COOKIE};
use crate::error::ApiError;
use crate::state::AppState;
use crate::tokens::{AuthError, IssuedSession, RefreshedTokens};

/// Open session request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// User whose credentials the identity service verified.
    pub user_id: UserId,
}

/// Refresh request; the cookie is used when the body has no token.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token.
    pub refresh_token: Option<String>,
}

/// Current user response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    /// User ID.
    pub user_id: UserId,
    /// Session ID.
    pub session_id: SessionId,
    /// Whether the session was confirmed in storage.
    pub session_verified: bool,
}

/// Session state response.
#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    /// Where the presented tokens stand.
    pub state: SessionState,
}

/// Open a session and set the session cookies.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    jar: CookieJar,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, CookieJar, Json<IssuedSession>), ApiError> {
    let now = state.now();
    let issued = state.tokens.create_session(body.user_id, now).await?;
    let secure = state.config.is_production();

    tracing::info!(
        service = %auth.service_name,
        user_id = %issued.user_id,
        session_id = %issued.session_id,
        "Session opened"
    );

    let jar = jar
        .add(token_cookie(
            SESSION_COOKIE,
            issued.access_token.clone(),
            issued.access_expires_at,
            now,
            secure,
        ))
        .add(token_cookie(
            REFRESH_COOKIE,
            issued.refresh_token.clone(),
            issued.refresh_expires_at,
            now,
            secure,
        ));

    Ok((StatusCode::CREATED, jar, Json(issued)))
}

/// Mint a new access token from the refresh token.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<RefreshedTokens>), ApiError> {
    let token = body
        .and_then(|Json(b)| b.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(&jar, REFRESH_COOKIE))
        .ok_or(ApiError::Unauthorized)?;

    let now = state.now();
    let refreshed = state.tokens.refresh(&token, now).await?;
    let secure = state.config.is_production();

    let mut jar = jar.add(token_cookie(
        SESSION_COOKIE,
        refreshed.access_token.clone(),
        refreshed.access_expires_at,
        now,
        secure,
    ));
    if let Some(rotated) = &refreshed.refresh_token {
        jar = jar.add(token_cookie(
            REFRESH_COOKIE,
            rotated.clone(),
            refreshed.refresh_expires_at,
            now,
            secure,
        ));
    }

    Ok((jar, Json(refreshed)))
}

/// End the current session and clear the cookies.
///
/// Answers 204 when a missing, invalid or already revoked token leaves
/// nothing to do. A storage outage is a 503 and the cookies are kept, since
/// the session could not be revoked.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    let candidates = [
        bearer_token(&headers),
        cookie_value(&jar, SESSION_COOKIE),
        cookie_value(&jar, REFRESH_COOKIE),
    ];

    for token in candidates.into_iter().flatten() {
        match state.tokens.logout(&token).await {
            Ok(_) => break,
            Err(e @ AuthError::StorageUnavailable(_)) => return Err(e.into()),
            Err(e) => tracing::debug!(error = %e, "Logout token rejected"),
        }
    }

    Ok((StatusCode::NO_CONTENT, clear_session_cookies(jar)))
}

/// End every session of the current user.
pub async fn logout_everywhere(
    State(state): State<Arc<AppState>>,
    auth: SessionAuth,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    state.tokens.logout_everywhere(&auth.user_id).await?;
    Ok((StatusCode::NO_CONTENT, clear_session_cookies(jar)))
}

/// Get the current user.
pub async fn me(auth: SessionAuth) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth.user_id,
        session_id: auth.session_id,
        session_verified: auth.session_verified,
    })
}

/// Report where the presented tokens stand.
pub async fn session_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Json<SessionStateResponse> {
    let access = bearer_token(&headers).or_else(|| cookie_value(&jar, SESSION_COOKIE));
    let refresh = cookie_value(&jar, REFRESH_COOKIE);

    let current = state
        .tokens
        .session_state(access.as_deref(), refresh.as_deref(), state.now())
        .await;

    Json(SessionStateResponse { state: current })
}
