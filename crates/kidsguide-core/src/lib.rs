//! Core types and pure logic for kidsguide venue tariffs and login sessions.
//!
//! - **Identifiers**: `VenueId`, `UserId`, `SessionId`, `HistoryEntryId`
//! - **Tariffs**: `Tier`, `PaidTier`, `TariffPlan`, `VenueEntitlement`, `FeatureLimits`
//! - **Ledger**: `TariffHistoryEntry`
//! - **Transitions**: planners used by the sweep and the admin handlers
//! - **Views**: `EntitlementView`, `EntitlementStatus`
//! - **Pricing**: `quote`, `PriceQuote`
//! - **Sessions**: `Session`, `SessionState`
//!
//! Nothing in this crate performs I/O or reads the clock on its own: every
//! time-dependent function takes `now` explicitly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod history;
pub mod ids;
pub mod pricing;
pub mod session;
pub mod status;
pub mod tariff;
pub mod transition;

pub use error::{Result, TariffError};
pub use history::TariffHistoryEntry;
pub use ids::{HistoryEntryId, IdError, SessionId, UserId, VenueId};
pub use pricing::{quote, PriceQuote};
pub use session::{Session, SessionState};
pub use status::{EntitlementStatus, EntitlementView};
pub use tariff::{FeatureLimits, PaidTariff, PaidTier, TariffPlan, TariffPolicy, Tier, VenueEntitlement};
pub use transition::{EntitlementChange, HistoryRollover, TransitionKind};
