//! Periodic tariff sweep.
//!
//! One run walks the paid venues three times:
//!
//! 1. expiry: renew or start the grace window
//! 2. grace expiry: downgrade to FREE
//! 3. counters: reset the monthly news counter
//!
//! Every transition goes through [`Store::transition_entitlement`], which
//! re-checks the guard against the stored record. Re-running a sweep, or two
//! sweeps racing, therefore applies each transition once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use kidsguide_core::transition::{plan_counter_reset, plan_expiry, plan_grace_expiry};
use kidsguide_core::{EntitlementChange, TariffPolicy, TransitionKind, VenueEntitlement, VenueId};
use kidsguide_store::{Store, StoreError};

/// Sweep phases, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    /// Renew or start grace on lapsed periods.
    Expiry,
    /// Downgrade venues whose grace window ended.
    GraceExpiry,
    /// Reset monthly usage counters.
    CounterReset,
}

impl SweepPhase {
    const ALL: [Self; 3] = [Self::Expiry, Self::GraceExpiry, Self::CounterReset];

    const fn name(self) -> &'static str {
        match self {
            Self::Expiry => "expiry",
            Self::GraceExpiry => "grace_expiry",
            Self::CounterReset => "counter_reset",
        }
    }
}

/// A venue that failed in one sweep phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueFailure {
    /// The venue.
    pub venue_id: VenueId,
    /// Phase the failure happened in.
    pub phase: SweepPhase,
    /// What went wrong.
    pub message: String,
}

/// Aggregate result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Paid venues examined, summed over phases.
    pub processed: usize,
    /// Periods renewed automatically.
    pub renewed: usize,
    /// Venues that entered the grace window.
    pub grace_period_started: usize,
    /// Venues moved to FREE.
    pub downgraded: usize,
    /// Monthly counters reset.
    pub counters_reset: usize,
    /// Per-venue failures, at most one per venue and phase; the other
    /// venues were still processed.
    pub errors: Vec<VenueFailure>,
}

impl SweepSummary {
    fn record(&mut self, kind: TransitionKind) {
        match kind {
            TransitionKind::Renewed => self.renewed += 1,
            TransitionKind::GracePeriodStarted => self.grace_period_started += 1,
            TransitionKind::Downgraded => self.downgraded += 1,
            TransitionKind::CounterReset => self.counters_reset += 1,
            TransitionKind::Activated | TransitionKind::Cancelled => {}
        }
    }
}

/// Runs tariff sweeps against a store.
pub struct TariffSweeper {
    store: Arc<dyn Store>,
    policy: TariffPolicy,
    concurrency: usize,
}

impl TariffSweeper {
    /// Create a sweeper processing up to `concurrency` venues at once.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, policy: TariffPolicy, concurrency: usize) -> Self {
        Self {
            store,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one sweep at `now`.
    ///
    /// Per-venue failures are collected in the summary.
    ///
    /// # Errors
    ///
    /// Returns the store error if the paid venues cannot be listed; no
    /// further phases run in that case.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError> {
        let mut summary = SweepSummary::default();

        for phase in SweepPhase::ALL {
            let venues = self.store.list_paid_entitlements().await.map_err(|e| {
                tracing::error!(phase = phase.name(), error = %e, "Listing paid venues failed");
                e
            })?;
            summary.processed += venues.len();

            let outcomes: Vec<_> = stream::iter(venues)
                .map(|venue| async move {
                    let venue_id = venue.venue_id;
                    (venue_id, self.apply(phase, venue_id, now).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (venue_id, outcome) in outcomes {
                match outcome {
                    Ok(Some(kind)) => {
                        tracing::info!(venue_id = %venue_id, transition = ?kind, "Tariff transition applied");
                        summary.record(kind);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            venue_id = %venue_id,
                            phase = phase.name(),
                            error = %e,
                            "Tariff transition failed"
                        );
                        summary.errors.push(VenueFailure {
                            venue_id,
                            phase,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            renewed = summary.renewed,
            grace_period_started = summary.grace_period_started,
            downgraded = summary.downgraded,
            counters_reset = summary.counters_reset,
            errors = summary.errors.len(),
            "Tariff sweep finished"
        );

        Ok(summary)
    }

    async fn apply(
        &self,
        phase: SweepPhase,
        venue_id: VenueId,
        now: DateTime<Utc>,
    ) -> Result<Option<TransitionKind>, StoreError> {
        let policy = self.policy;
        let planner = move |current: &VenueEntitlement| -> Option<EntitlementChange> {
            match phase {
                SweepPhase::Expiry => plan_expiry(current, now, &policy),
                SweepPhase::GraceExpiry => plan_grace_expiry(current, now),
                SweepPhase::CounterReset => plan_counter_reset(current, now),
            }
        };
        let change = self.store.transition_entitlement(&venue_id, &planner).await?;
        Ok(change.map(|c| c.kind))
    }
}
