//! Session cleanup job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokens::{AuthError, TokenManager};

/// Result of one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    /// Sessions deleted.
    pub deleted: u64,
}

/// Delete every session that ended at or before `now`.
///
/// # Errors
///
/// Returns `AuthError::StorageUnavailable` if the store cannot be reached.
pub async fn run(tokens: &TokenManager, now: DateTime<Utc>) -> Result<CleanupSummary, AuthError> {
    let deleted = tokens.cleanup_expired(now).await.map_err(|e| {
        tracing::error!(error = %e, "Session cleanup failed");
        e
    })?;
    tracing::info!(deleted, "Session cleanup finished");
    Ok(CleanupSummary { deleted })
}
