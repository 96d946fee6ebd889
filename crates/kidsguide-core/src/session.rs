//! Login sessions.
//!
//! A session is the server-side record behind a refresh token and the only
//! place a long-lived credential can be revoked.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{SessionId, UserId};

/// A persisted login session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id, embedded in every token of the session.
    pub session_id: SessionId,
    /// Owner.
    pub user_id: UserId,
    /// Keyed digest of the current refresh token.
    pub refresh_token_digest: String,
    /// Fixed end of the session.
    pub expires_at: DateTime<Utc>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the refresh token was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session lasting `ttl` from `now`.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        refresh_token_digest: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id,
            user_id,
            refresh_token_digest,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the session is past its end at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lifecycle state of a session as seen by a client holding its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session was ever created.
    NoSession,
    /// The access token is valid.
    Active,
    /// The access token expired but the refresh token can mint a new one.
    AccessExpired,
    /// Both tokens are unusable; the session is gone or past its end.
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expires_at_ttl_boundary() {
        let now = Utc::now();
        let session = Session::new(
            SessionId::generate(),
            UserId::generate(),
            "digest".into(),
            now,
            Duration::days(7),
        );
        assert!(!session.is_expired(now + Duration::days(7) - Duration::seconds(1)));
        assert!(session.is_expired(now + Duration::days(7)));
    }
}
