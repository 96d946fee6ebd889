//! Periodic jobs.
//!
//! Both jobs are plain reentrant functions, normally triggered through the
//! cron endpoints. [`spawn_schedules`] can additionally run them on in-process
//! timers.

pub mod session_cleanup;
pub mod tariff_sweep;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Start interval timers for the jobs that have one configured.
pub fn spawn_schedules(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if let Some(seconds) = state.config.tariff_sweep_interval_seconds {
        let state = Arc::clone(state);
        tracing::info!(interval_seconds = seconds, "Scheduling tariff sweep");
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(seconds));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                // Errors are logged inside; the next tick retries.
                let _ = state.sweeper.run(state.now()).await;
            }
        }));
    }

    if let Some(seconds) = state.config.session_cleanup_interval_seconds {
        let state = Arc::clone(state);
        tracing::info!(interval_seconds = seconds, "Scheduling session cleanup");
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(seconds));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let _ = session_cleanup::run(&state.tokens, state.now()).await;
            }
        }));
    }

    handles
}
