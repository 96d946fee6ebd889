//! Error types for kidsguide core.

use crate::ids::IdError;
use crate::tariff::Tier;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, TariffError>;

/// Validation errors raised by tariff operations.
///
/// These never imply a state change: the request is rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TariffError {
    /// Unknown tier name.
    #[error("invalid tier: {0}")]
    InvalidTier(String),

    /// A paid tier was required.
    #[error("tier {0} cannot be purchased")]
    NotPaidTier(Tier),

    /// Duration outside the purchasable range.
    #[error("invalid duration: {days} days (allowed {min}..={max})")]
    InvalidDuration {
        /// Requested days.
        days: i64,
        /// Smallest allowed value.
        min: i64,
        /// Largest allowed value.
        max: i64,
    },

    /// Negative or overflowing amount.
    #[error("invalid price: {0}")]
    InvalidPrice(i64),

    /// Malformed identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
