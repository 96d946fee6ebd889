//! Venue tariff tiers and entitlements.
//!
//! A venue is either on the FREE tier or holds a paid period on SUPER or
//! MAXIMUM. The paid data (expiry, auto-renew, grace window, price) only
//! exists inside [`TariffPlan::Paid`], so a FREE venue cannot carry an
//! expiry or a price.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TariffError;
use crate::VenueId;

// ============================================================================
// Constants
// ============================================================================

/// Default grace window after a paid period lapses without auto-renew.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 3;

/// Default length of an automatically renewed period.
pub const DEFAULT_RENEWAL_PERIOD_DAYS: i64 = 30;

/// A paid period ending within this many days is reported as expiring.
pub const DEFAULT_EXPIRING_WINDOW_DAYS: i64 = 7;

/// Service level of a venue listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Free listing.
    Free,
    /// First paid tier.
    Super,
    /// Top paid tier.
    Maximum,
}

impl Tier {
    /// Wire name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Super => "SUPER",
            Self::Maximum => "MAXIMUM",
        }
    }

    /// The paid counterpart, or `None` for FREE.
    #[must_use]
    pub const fn paid(self) -> Option<PaidTier> {
        match self {
            Self::Free => None,
            Self::Super => Some(PaidTier::Super),
            Self::Maximum => Some(PaidTier::Maximum),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TariffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Self::Free),
            "SUPER" => Ok(Self::Super),
            "MAXIMUM" => Ok(Self::Maximum),
            _ => Err(TariffError::InvalidTier(s.to_string())),
        }
    }
}

/// The tiers that can be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaidTier {
    /// SUPER tier.
    Super,
    /// MAXIMUM tier.
    Maximum,
}

impl PaidTier {
    /// Widen to the general tier enum.
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self {
            Self::Super => Tier::Super,
            Self::Maximum => Tier::Maximum,
        }
    }
}

impl FromStr for PaidTier {
    type Err = TariffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tier: Tier = s.parse()?;
        tier.paid().ok_or(TariffError::NotPaidTier(tier))
    }
}

/// Data carried by a venue while it holds a paid tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidTariff {
    /// Which paid tier.
    pub tier: PaidTier,
    /// End of the current paid period.
    pub expires_at: DateTime<Utc>,
    /// Renew automatically instead of entering the grace window.
    pub auto_renew: bool,
    /// Set only while the venue sits in the grace window.
    pub grace_period_ends_at: Option<DateTime<Utc>>,
    /// Price of the current period in minor currency units.
    pub price_minor: i64,
}

/// Tagged tariff state of a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TariffPlan {
    /// FREE tier, no paid data.
    Free,
    /// Paid tier with its period data.
    Paid(PaidTariff),
}

/// The durable entitlement record of one venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEntitlement {
    /// Owning venue.
    pub venue_id: VenueId,
    /// Current tariff state.
    pub plan: TariffPlan,
    /// News posts published in the current monthly window.
    pub monthly_news_count: u32,
    /// Start of the current monthly counting window.
    pub counter_reset_at: Option<DateTime<Utc>>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl VenueEntitlement {
    /// A fresh FREE entitlement for a newly registered venue.
    #[must_use]
    pub fn new_free(venue_id: VenueId, now: DateTime<Utc>) -> Self {
        Self {
            venue_id,
            plan: TariffPlan::Free,
            monthly_news_count: 0,
            counter_reset_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        match &self.plan {
            TariffPlan::Free => Tier::Free,
            TariffPlan::Paid(paid) => paid.tier.tier(),
        }
    }

    /// Paid period data, if any.
    #[must_use]
    pub fn paid(&self) -> Option<&PaidTariff> {
        match &self.plan {
            TariffPlan::Free => None,
            TariffPlan::Paid(paid) => Some(paid),
        }
    }

    /// Whether the venue holds a paid tier.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.paid().is_some()
    }

    /// End of the paid period.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.paid().map(|p| p.expires_at)
    }

    /// End of the grace window, if the venue is in one.
    #[must_use]
    pub fn grace_period_ends_at(&self) -> Option<DateTime<Utc>> {
        self.paid().and_then(|p| p.grace_period_ends_at)
    }

    /// Auto-renew flag (always false on FREE).
    #[must_use]
    pub fn auto_renew(&self) -> bool {
        self.paid().is_some_and(|p| p.auto_renew)
    }

    /// Price of the current paid period.
    #[must_use]
    pub fn price_minor(&self) -> Option<i64> {
        self.paid().map(|p| p.price_minor)
    }

    /// Feature limits of the current tier.
    #[must_use]
    pub fn limits(&self) -> FeatureLimits {
        FeatureLimits::for_tier(self.tier())
    }
}

/// Per-tier feature limits shown to vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureLimits {
    /// Maximum photos in the venue gallery.
    pub max_photos: u32,
    /// News posts allowed per calendar month; `None` means unlimited.
    pub monthly_news_posts: Option<u32>,
    /// Listing is ranked above free venues.
    pub priority_listing: bool,
    /// Access to visitor analytics.
    pub analytics: bool,
    /// Promotional badge on the listing card.
    pub promo_badge: bool,
    /// Links to external booking sites and socials.
    pub external_links: bool,
}

impl FeatureLimits {
    /// Limits for the given tier.
    #[must_use]
    pub const fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                max_photos: 5,
                monthly_news_posts: Some(1),
                priority_listing: false,
                analytics: false,
                promo_badge: false,
                external_links: false,
            },
            Tier::Super => Self {
                max_photos: 20,
                monthly_news_posts: Some(5),
                priority_listing: true,
                analytics: true,
                promo_badge: false,
                external_links: true,
            },
            Tier::Maximum => Self {
                max_photos: 50,
                monthly_news_posts: None,
                priority_listing: true,
                analytics: true,
                promo_badge: true,
                external_links: true,
            },
        }
    }
}

/// Time constants that drive tier transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffPolicy {
    /// Grace window after a non-renewing period lapses.
    pub grace_period: Duration,
    /// Length of an automatically renewed period.
    pub renewal_period: Duration,
    /// Remaining time below which a paid period is reported as expiring.
    pub expiring_window: Duration,
}

impl TariffPolicy {
    /// Build a policy from day counts.
    #[must_use]
    pub fn from_days(grace_days: i64, renewal_days: i64) -> Self {
        Self {
            grace_period: Duration::days(grace_days),
            renewal_period: Duration::days(renewal_days),
            ..Self::default()
        }
    }
}

impl Default for TariffPolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::days(DEFAULT_GRACE_PERIOD_DAYS),
            renewal_period: Duration::days(DEFAULT_RENEWAL_PERIOD_DAYS),
            expiring_window: Duration::days(DEFAULT_EXPIRING_WINDOW_DAYS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_parsing_is_case_insensitive() {
        assert_eq!("super".parse::<Tier>().unwrap(), Tier::Super);
        assert_eq!(" MAXIMUM ".parse::<Tier>().unwrap(), Tier::Maximum);
        assert!(matches!(
            "gold".parse::<Tier>(),
            Err(TariffError::InvalidTier(_))
        ));
    }

    #[test]
    fn free_is_not_a_paid_tier() {
        assert!(matches!(
            "free".parse::<PaidTier>(),
            Err(TariffError::NotPaidTier(Tier::Free))
        ));
        assert_eq!("super".parse::<PaidTier>().unwrap(), PaidTier::Super);
    }

    #[test]
    fn free_entitlement_has_no_paid_fields() {
        let ent = VenueEntitlement::new_free(VenueId::generate(), Utc::now());
        assert_eq!(ent.tier(), Tier::Free);
        assert!(ent.expires_at().is_none());
        assert!(ent.grace_period_ends_at().is_none());
        assert!(ent.price_minor().is_none());
        assert!(!ent.auto_renew());
    }

    #[test]
    fn limits_grow_with_tier() {
        let free = FeatureLimits::for_tier(Tier::Free);
        let sup = FeatureLimits::for_tier(Tier::Super);
        let max = FeatureLimits::for_tier(Tier::Maximum);
        assert!(free.max_photos < sup.max_photos && sup.max_photos < max.max_photos);
        assert_eq!(max.monthly_news_posts, None);
        assert!(max.promo_badge && !sup.promo_badge);
    }

    #[test]
    fn plan_serializes_with_tag() {
        let json = serde_json::to_value(TariffPlan::Free).unwrap();
        assert_eq!(json["plan"], "FREE");
    }
}
