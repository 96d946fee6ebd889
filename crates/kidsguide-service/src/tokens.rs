//! Access/refresh token lifecycle.
//!
//! Both tokens are HS256 JWTs carrying the session id and a `typ`
//! discriminator. The session row is the revocation point: logout deletes
//! it, refresh requires it. Access validation may fall back to the signature
//! alone when the session store is unreachable; refresh never does.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use kidsguide_core::{Session, SessionId, SessionState, UserId};
use kidsguide_store::{Store, StoreError};

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Token discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token that mints access tokens.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        })
    }
}

/// JWT claims shared by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Session id.
    pub sid: String,
    /// Token type.
    pub typ: TokenType,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

/// Token lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed token or bad signature.
    #[error("invalid token")]
    InvalidSignature,

    /// A token of the other type was presented.
    #[error("wrong token type: expected {expected}")]
    WrongTokenType {
        /// The type the operation needs.
        expected: TokenType,
    },

    /// The access token is past its expiry.
    #[error("token expired")]
    TokenExpired,

    /// The session was deleted or the refresh token does not match it.
    #[error("session not found")]
    SessionNotFound,

    /// The session is past its end.
    #[error("session expired")]
    SessionExpired,

    /// The session store could not be reached.
    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Signing a token failed.
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl AuthError {
    /// Stable machine-readable reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::WrongTokenType { .. } => "wrong_token_type",
            Self::TokenExpired => "token_expired",
            Self::SessionNotFound => "session_not_found",
            Self::SessionExpired => "session_expired",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Encoding(_) => "encoding_failed",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Token lifecycle settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token and session lifetime.
    pub refresh_ttl: Duration,
    /// Accept signed access tokens when the session store is unreachable.
    pub availability_over_strict_revocation: bool,
    /// Cross-check access tokens against the session store.
    pub verify_access_sessions: bool,
    /// Replace the refresh token on every refresh.
    pub rotate_refresh_tokens: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(7),
            availability_over_strict_revocation: true,
            verify_access_sessions: true,
            rotate_refresh_tokens: false,
        }
    }
}

/// Tokens issued at login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    /// New session.
    pub session_id: SessionId,
    /// Owner.
    pub user_id: UserId,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token and session expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    /// Session the tokens belong to.
    pub session_id: SessionId,
    /// New access token.
    pub access_token: String,
    /// New access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Replacement refresh token, present only when rotation is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Session expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// A validated access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGrant {
    /// Authenticated user.
    pub user_id: UserId,
    /// Session the token belongs to.
    pub session_id: SessionId,
    /// Whether the session row was confirmed in storage.
    pub session_verified: bool,
}

/// Issues, validates, refreshes and revokes session tokens.
pub struct TokenManager {
    store: Arc<dyn Store>,
    settings: TokenSettings,
    secret: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenManager {
    /// Create a manager signing with `secret`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, secret: &str, settings: TokenSettings) -> Self {
        Self {
            store,
            settings,
            secret: secret.to_string(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// The active settings.
    #[must_use]
    pub const fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Open a session for `user_id` and issue its tokens.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` if the session cannot be persisted.
    pub async fn create_session(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, AuthError> {
        let session_id = SessionId::generate();
        let refresh_expires_at = now + self.settings.refresh_ttl;
        let refresh_token = self.sign(user_id, session_id, TokenType::Refresh, now, refresh_expires_at)?;

        let session = Session::new(
            session_id,
            user_id,
            self.digest(&refresh_token),
            now,
            self.settings.refresh_ttl,
        );
        self.store.put_session(&session).await?;

        let access_expires_at = now + self.settings.access_ttl;
        let access_token = self.sign(user_id, session_id, TokenType::Access, now, access_expires_at)?;

        tracing::info!(user_id = %user_id, session_id = %session_id, "Session created");

        Ok(IssuedSession {
            session_id,
            user_id,
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate an access token.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`, `WrongTokenType` or `TokenExpired` for a bad token.
    /// - `SessionNotFound` or `SessionExpired` when the session is gone.
    /// - `StorageUnavailable` if storage fails and signature-only acceptance
    ///   is disabled.
    pub async fn validate_access(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessGrant, AuthError> {
        let (claims, user_id, session_id) = self.verify(token)?;
        if claims.typ != TokenType::Access {
            return Err(AuthError::WrongTokenType {
                expected: TokenType::Access,
            });
        }
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }

        let mut grant = AccessGrant {
            user_id,
            session_id,
            session_verified: false,
        };
        if !self.settings.verify_access_sessions {
            return Ok(grant);
        }

        match self.store.get_session(&session_id).await {
            Ok(Some(session)) if session.user_id != user_id => Err(AuthError::SessionNotFound),
            Ok(Some(session)) if session.is_expired(now) => Err(AuthError::SessionExpired),
            Ok(Some(_)) => {
                grant.session_verified = true;
                Ok(grant)
            }
            Ok(None) => Err(AuthError::SessionNotFound),
            Err(e) if self.settings.availability_over_strict_revocation => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Session store unreachable - accepting access token on signature"
                );
                Ok(grant)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mint a new access token from a refresh token.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` or `WrongTokenType` for a bad token.
    /// - `SessionNotFound` if the session was deleted, or the token is not
    ///   the session's current refresh token.
    /// - `SessionExpired` past the session end.
    /// - `StorageUnavailable` on any storage failure.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshedTokens, AuthError> {
        let session = self.active_session(refresh_token, now).await?;
        let (user_id, session_id) = (session.user_id, session.session_id);

        let access_expires_at = now + self.settings.access_ttl;
        let access_token = self.sign(user_id, session_id, TokenType::Access, now, access_expires_at)?;

        let rotated = if self.settings.rotate_refresh_tokens {
            let token = self.sign(user_id, session_id, TokenType::Refresh, now, session.expires_at)?;
            let swapped = self
                .store
                .rotate_refresh_token(
                    &session_id,
                    &session.refresh_token_digest,
                    &self.digest(&token),
                    now,
                )
                .await?;
            if !swapped {
                // Lost a race with a concurrent refresh or logout.
                return Err(AuthError::SessionNotFound);
            }
            Some(token)
        } else {
            None
        };

        tracing::debug!(session_id = %session_id, rotated = rotated.is_some(), "Session refreshed");

        Ok(RefreshedTokens {
            session_id,
            access_token,
            access_expires_at,
            refresh_token: rotated,
            refresh_expires_at: session.expires_at,
        })
    }

    /// Revoke the session a token belongs to.
    ///
    /// Either token type is accepted and expiry is ignored, so a stale
    /// access token can still end its session. Returns whether a session was
    /// deleted; deleting an absent session is not an error.
    ///
    /// # Errors
    ///
    /// `InvalidSignature` for a bad token, `StorageUnavailable` on storage
    /// failure.
    pub async fn logout(&self, token: &str) -> Result<bool, AuthError> {
        let (_, user_id, session_id) = self.verify(token)?;
        let deleted = self.store.delete_session(&session_id).await?;
        tracing::info!(user_id = %user_id, session_id = %session_id, deleted, "Session logged out");
        Ok(deleted)
    }

    /// Revoke every session of a user.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on storage failure.
    pub async fn logout_everywhere(&self, user_id: &UserId) -> Result<u64, AuthError> {
        let deleted = self.store.delete_user_sessions(user_id).await?;
        tracing::info!(user_id = %user_id, deleted, "All sessions logged out");
        Ok(deleted)
    }

    /// Delete sessions whose end is at or before `now`.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on storage failure.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(self.store.delete_expired_sessions(now).await?)
    }

    /// Where a client holding these tokens stands at `now`.
    pub async fn session_state(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> SessionState {
        if access_token.is_none() && refresh_token.is_none() {
            return SessionState::NoSession;
        }
        if let Some(token) = access_token {
            if self.validate_access(token, now).await.is_ok() {
                return SessionState::Active;
            }
        }
        if let Some(token) = refresh_token {
            if self.active_session(token, now).await.is_ok() {
                return SessionState::AccessExpired;
            }
        }
        SessionState::Expired
    }

    /// Resolve the live session behind a refresh token.
    async fn active_session(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let (claims, user_id, session_id) = self.verify(refresh_token)?;
        if claims.typ != TokenType::Refresh {
            return Err(AuthError::WrongTokenType {
                expected: TokenType::Refresh,
            });
        }

        let session = self
            .store
            .get_session(&session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.user_id != user_id
            || !constant_time_eq(&session.refresh_token_digest, &self.digest(refresh_token))
        {
            return Err(AuthError::SessionNotFound);
        }
        if session.is_expired(now) || claims.exp <= now.timestamp() {
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    fn sign(
        &self,
        user_id: UserId,
        session_id: SessionId,
        typ: TokenType,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            typ,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Check the signature and parse the ids. Expiry is left to the caller.
    fn verify(&self, token: &str) -> Result<(Claims, UserId, SessionId), AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                AuthError::InvalidSignature
            })?
            .claims;

        let user_id = claims.sub.parse::<UserId>().map_err(|_| AuthError::InvalidSignature)?;
        let session_id = claims.sid.parse::<SessionId>().map_err(|_| AuthError::InvalidSignature)?;
        Ok((claims, user_id, session_id))
    }

    fn digest(&self, refresh_token: &str) -> String {
        hmac_sha256_hex(&self.secret, refresh_token)
    }
}
