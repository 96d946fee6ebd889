//! Tariff pricing.
//!
//! Prices are integer minor currency units. A purchase is priced per day
//! against a 30-day month, rounded up, with a discount for long periods.

use serde::Serialize;

use crate::error::{Result, TariffError};
use crate::tariff::PaidTier;

/// SUPER monthly price (990.00).
pub const SUPER_MONTHLY_PRICE_MINOR: i64 = 99_000;

/// MAXIMUM monthly price (1990.00).
pub const MAXIMUM_MONTHLY_PRICE_MINOR: i64 = 199_000;

/// Shortest purchasable period.
pub const MIN_DURATION_DAYS: i64 = 1;

/// Longest purchasable period.
pub const MAX_DURATION_DAYS: i64 = 365;

const DAYS_PER_MONTH: i64 = 30;

impl PaidTier {
    /// Price of 30 days on this tier.
    #[must_use]
    pub const fn monthly_price_minor(self) -> i64 {
        match self {
            Self::Super => SUPER_MONTHLY_PRICE_MINOR,
            Self::Maximum => MAXIMUM_MONTHLY_PRICE_MINOR,
        }
    }
}

/// Discount applied to a purchase of `days`.
#[must_use]
pub const fn long_term_discount_percent(days: i64) -> u8 {
    match days {
        d if d >= 180 => 20,
        d if d >= 90 => 10,
        _ => 0,
    }
}

/// Computed price of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Tier being bought.
    pub tier: PaidTier,
    /// Period length.
    pub duration_days: i64,
    /// Price before discount.
    pub base_minor: i64,
    /// Discount percentage applied.
    pub discount_percent: u8,
    /// Amount to pay.
    pub amount_minor: i64,
}

/// Price `tier` for `duration_days`.
///
/// # Errors
///
/// Returns `TariffError::InvalidDuration` when the duration is outside
/// `MIN_DURATION_DAYS..=MAX_DURATION_DAYS`.
pub fn quote(tier: PaidTier, duration_days: i64) -> Result<PriceQuote> {
    if !(MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&duration_days) {
        return Err(TariffError::InvalidDuration {
            days: duration_days,
            min: MIN_DURATION_DAYS,
            max: MAX_DURATION_DAYS,
        });
    }

    let monthly = tier.monthly_price_minor();
    let base_minor = ceil_div(monthly * duration_days, DAYS_PER_MONTH);
    let discount_percent = long_term_discount_percent(duration_days);
    let amount_minor = ceil_div(base_minor * (100 - i64::from(discount_percent)), 100);

    Ok(PriceQuote {
        tier,
        duration_days,
        base_minor,
        discount_percent,
        amount_minor,
    })
}

const fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}
