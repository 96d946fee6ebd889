//! Tier transitions as pure functions.
//!
//! Each planner looks at one entitlement snapshot and a point in time and
//! either returns the change to apply or `None` when its guard does not hold.
//! Storage backends call planners again inside their per-venue atomic
//! section, so a change that was already applied plans to `None` and a
//! repeated sweep is a no-op.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;

use crate::history::TariffHistoryEntry;
use crate::tariff::{PaidTariff, PaidTier, TariffPlan, TariffPolicy, Tier, VenueEntitlement};

/// What a change does, used for counting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Expired period renewed in place.
    Renewed,
    /// Expired period entered the grace window.
    GracePeriodStarted,
    /// Grace window elapsed, venue moved to FREE.
    Downgraded,
    /// Monthly feature counter reset.
    CounterReset,
    /// Paid period activated after payment confirmation.
    Activated,
    /// Explicit move to FREE requested by an operator.
    Cancelled,
}

/// Closes the venue's open ledger entry and opens `opened`, both at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRollover {
    /// Instant the previous period ends and the new one starts.
    pub at: DateTime<Utc>,
    /// The entry to append.
    pub opened: TariffHistoryEntry,
}

/// A planned write to one venue, applied all-or-nothing by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementChange {
    /// What the change does.
    pub kind: TransitionKind,
    /// The record after the change.
    pub updated: VenueEntitlement,
    /// Ledger rollover, when the change starts a new tier period.
    pub rollover: Option<HistoryRollover>,
}

/// First instant of the calendar month containing `now` (UTC).
#[must_use]
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Phase A: a paid period has lapsed and no grace window is running.
///
/// Auto-renewing venues get a fresh period and a ledger rollover; the others
/// enter the grace window with the ledger left untouched.
#[must_use]
pub fn plan_expiry(
    current: &VenueEntitlement,
    now: DateTime<Utc>,
    policy: &TariffPolicy,
) -> Option<EntitlementChange> {
    let paid = current.paid()?;
    if paid.expires_at >= now || paid.grace_period_ends_at.is_some() {
        return None;
    }

    let mut updated = current.clone();
    updated.updated_at = now;

    if paid.auto_renew {
        updated.plan = TariffPlan::Paid(PaidTariff {
            expires_at: now + policy.renewal_period,
            ..paid.clone()
        });
        let opened = TariffHistoryEntry::open(
            current.venue_id,
            paid.tier.tier(),
            Some(paid.price_minor),
            true,
            now,
        );
        Some(EntitlementChange {
            kind: TransitionKind::Renewed,
            updated,
            rollover: Some(HistoryRollover { at: now, opened }),
        })
    } else {
        updated.plan = TariffPlan::Paid(PaidTariff {
            grace_period_ends_at: Some(now + policy.grace_period),
            ..paid.clone()
        });
        Some(EntitlementChange {
            kind: TransitionKind::GracePeriodStarted,
            updated,
            rollover: None,
        })
    }
}

/// Phase B: the grace window has elapsed, so the venue drops to FREE.
#[must_use]
pub fn plan_grace_expiry(current: &VenueEntitlement, now: DateTime<Utc>) -> Option<EntitlementChange> {
    let grace_ends = current.grace_period_ends_at()?;
    if grace_ends >= now {
        return None;
    }
    Some(to_free(current, now, TransitionKind::Downgraded))
}

/// Phase C: the monthly counter of a paid venue belongs to an earlier month.
#[must_use]
pub fn plan_counter_reset(current: &VenueEntitlement, now: DateTime<Utc>) -> Option<EntitlementChange> {
    if !current.is_paid() {
        return None;
    }
    let window_start = month_start(now);
    if current.counter_reset_at.is_some_and(|at| at >= window_start) {
        return None;
    }

    let mut updated = current.clone();
    updated.monthly_news_count = 0;
    updated.counter_reset_at = Some(window_start);
    updated.updated_at = now;
    Some(EntitlementChange {
        kind: TransitionKind::CounterReset,
        updated,
        rollover: None,
    })
}

/// Start a paid period after payment was confirmed.
///
/// Buying the tier a venue already holds, while that period has not expired,
/// extends it from its current end. Any other purchase starts at `now`. The
/// grace window, if any, is cleared either way.
#[must_use]
pub fn plan_activation(
    current: &VenueEntitlement,
    tier: PaidTier,
    duration: Duration,
    price_minor: i64,
    auto_renew: bool,
    now: DateTime<Utc>,
) -> EntitlementChange {
    let base = current
        .paid()
        .filter(|p| p.tier == tier && p.expires_at > now && p.grace_period_ends_at.is_none())
        .map_or(now, |p| p.expires_at);

    let mut updated = current.clone();
    updated.plan = TariffPlan::Paid(PaidTariff {
        tier,
        expires_at: base + duration,
        auto_renew,
        grace_period_ends_at: None,
        price_minor,
    });
    updated.updated_at = now;

    let opened = TariffHistoryEntry::open(current.venue_id, tier.tier(), Some(price_minor), false, now);
    EntitlementChange {
        kind: TransitionKind::Activated,
        updated,
        rollover: Some(HistoryRollover { at: now, opened }),
    }
}

/// Move a paid venue to FREE immediately.
#[must_use]
pub fn plan_cancellation(current: &VenueEntitlement, now: DateTime<Utc>) -> Option<EntitlementChange> {
    current
        .is_paid()
        .then(|| to_free(current, now, TransitionKind::Cancelled))
}

fn to_free(current: &VenueEntitlement, now: DateTime<Utc>, kind: TransitionKind) -> EntitlementChange {
    let mut updated = current.clone();
    updated.plan = TariffPlan::Free;
    updated.updated_at = now;
    let opened = TariffHistoryEntry::open(current.venue_id, Tier::Free, None, false, now);
    EntitlementChange {
        kind,
        updated,
        rollover: Some(HistoryRollover { at: now, opened }),
    }
}
