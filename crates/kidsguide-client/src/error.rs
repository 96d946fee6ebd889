//! Client error types.

/// Errors that can occur when using the kidsguide client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Credentials were missing or rejected.
    #[error("unauthenticated: {reason}")]
    Unauthenticated {
        /// Why the token was rejected, e.g. `token_expired`.
        reason: String,
    },

    /// Venue not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Service storage is down; retry later.
    #[error("service unavailable")]
    Unavailable,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether an expired access token caused this error, so a refresh may help.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        matches!(self, Self::Unauthenticated { reason } if reason == "token_expired")
    }
}
