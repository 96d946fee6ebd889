//! Vendor-facing entitlement view.
//!
//! Derived from a snapshot without side effects. Venues whose period or grace
//! window already passed but which the sweep has not processed yet are shown
//! as `expired`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tariff::{FeatureLimits, TariffPolicy, Tier, VenueEntitlement};
use crate::VenueId;

/// Computed tariff status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// Paid period running.
    Active,
    /// Paid period ends within the expiring window.
    Expiring,
    /// Period lapsed, grace window running.
    GracePeriod,
    /// Period or grace lapsed, awaiting the sweep.
    Expired,
    /// FREE tier.
    Free,
}

/// Snapshot of a venue's tariff for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    /// Venue.
    pub venue_id: VenueId,
    /// Current tier.
    pub tier: Tier,
    /// Computed status.
    pub status: EntitlementStatus,
    /// End of the paid period.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whole days (rounded up) until the paid period ends.
    pub days_until_expiry: Option<i64>,
    /// End of the grace window.
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    /// Whole days (rounded up) left in the grace window.
    pub grace_days_remaining: Option<i64>,
    /// Auto-renew flag.
    pub auto_renew: bool,
    /// Price of the current period in minor units.
    pub price_minor: Option<i64>,
    /// Feature limits of the tier.
    pub limits: FeatureLimits,
    /// News posts used this month.
    pub news_posts_used: u32,
    /// News posts left this month; `None` means unlimited.
    pub news_posts_remaining: Option<u32>,
    /// Set when storage could not be read and FREE was assumed.
    pub degraded: bool,
}

impl EntitlementView {
    /// Derive the view for `entitlement` at `now`.
    #[must_use]
    pub fn from_entitlement(
        entitlement: &VenueEntitlement,
        now: DateTime<Utc>,
        policy: &TariffPolicy,
    ) -> Self {
        let limits = entitlement.limits();
        let status = status_at(entitlement, now, policy);
        let paid = entitlement.paid();

        let days_until_expiry = paid
            .filter(|p| p.grace_period_ends_at.is_none())
            .map(|p| days_ceil(p.expires_at - now));
        let grace_days_remaining = paid
            .and_then(|p| p.grace_period_ends_at)
            .map(|ends| days_ceil(ends - now));

        Self {
            venue_id: entitlement.venue_id,
            tier: entitlement.tier(),
            status,
            expires_at: entitlement.expires_at(),
            days_until_expiry,
            grace_period_ends_at: entitlement.grace_period_ends_at(),
            grace_days_remaining,
            auto_renew: entitlement.auto_renew(),
            price_minor: entitlement.price_minor(),
            limits,
            news_posts_used: entitlement.monthly_news_count,
            news_posts_remaining: limits
                .monthly_news_posts
                .map(|max| max.saturating_sub(entitlement.monthly_news_count)),
            degraded: false,
        }
    }

    /// The FREE view used when no record exists or storage is unreachable.
    #[must_use]
    pub fn free(venue_id: VenueId, now: DateTime<Utc>, degraded: bool) -> Self {
        let mut view = Self::from_entitlement(
            &VenueEntitlement::new_free(venue_id, now),
            now,
            &TariffPolicy::default(),
        );
        view.degraded = degraded;
        view
    }
}

/// Status of `entitlement` at `now`.
#[must_use]
pub fn status_at(
    entitlement: &VenueEntitlement,
    now: DateTime<Utc>,
    policy: &TariffPolicy,
) -> EntitlementStatus {
    let Some(paid) = entitlement.paid() else {
        return EntitlementStatus::Free;
    };
    match paid.grace_period_ends_at {
        Some(ends) if ends > now => EntitlementStatus::GracePeriod,
        Some(_) => EntitlementStatus::Expired,
        None if paid.expires_at <= now => EntitlementStatus::Expired,
        None if paid.expires_at - now <= policy.expiring_window => EntitlementStatus::Expiring,
        None => EntitlementStatus::Active,
    }
}

/// Days in `remaining`, rounded up; never negative.
fn days_ceil(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + 86_399) / 86_400
}
