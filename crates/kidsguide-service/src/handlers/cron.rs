//! Cron trigger handlers.
//!
//! The external scheduler calls these with the shared cron secret. A bad
//! secret is rejected by the `CronAuth` extractor before the job runs.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::CronAuth;
use crate::error::ApiError;
use crate::jobs::session_cleanup::{self, CleanupSummary};
use crate::jobs::tariff_sweep::SweepSummary;
use crate::state::AppState;

/// Run one tariff sweep.
///
/// Per-venue failures are reported in the summary with a 200; only a store
/// that cannot list venues at all yields 503.
pub async fn run_tariff_sweep(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
) -> Result<Json<SweepSummary>, ApiError> {
    let summary = state
        .sweeper
        .run(state.now())
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    Ok(Json(summary))
}

/// Delete expired sessions.
pub async fn run_session_cleanup(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
) -> Result<Json<CleanupSummary>, ApiError> {
    let summary = session_cleanup::run(&state.tokens, state.now()).await?;
    Ok(Json(summary))
}
