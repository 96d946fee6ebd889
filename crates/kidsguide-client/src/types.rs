//! Request and response types for the kidsguide client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kidsguide_core::{PaidTier, SessionId, SessionState, TariffHistoryEntry, Tier, UserId, VenueId};

pub use kidsguide_core::{EntitlementStatus, EntitlementView, FeatureLimits};

/// Tokens issued when a session is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    /// New session.
    pub session_id: SessionId,
    /// Owner.
    pub user_id: UserId,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Session expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Tokens returned by a refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    /// Session the tokens belong to.
    pub session_id: SessionId,
    /// New access token.
    pub access_token: String,
    /// New access token expiry.
    pub access_expires_at: DateTime<Utc>,
    /// Replacement refresh token when the server rotates them.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Session expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Current user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User ID.
    pub user_id: UserId,
    /// Session ID.
    pub session_id: SessionId,
    /// False when the server accepted the token without reaching storage.
    pub session_verified: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionStateResponse {
    pub state: SessionState,
}

/// Tariff periods of a venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffHistory {
    /// Venue.
    pub venue_id: VenueId,
    /// The period in effect now.
    pub current: Option<TariffHistoryEntry>,
    /// All periods ordered by start.
    pub entries: Vec<TariffHistoryEntry>,
}

/// Payment to collect for an upgrade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Venue being upgraded.
    pub venue_id: VenueId,
    /// Tier being bought.
    pub tier: PaidTier,
    /// Period length in days.
    pub duration_days: i64,
    /// Amount to charge in minor units.
    pub amount: i64,
    /// Price before the long-term discount.
    pub base_amount: i64,
    /// Long-term discount applied.
    pub discount_percent: u8,
    /// Currency code.
    pub currency: String,
    /// Purchase description.
    pub description: String,
}

/// Confirmed tier change applied by an admin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTariffRequest {
    /// Target tier; FREE cancels the paid period.
    pub tier: Tier,
    /// Paid period length; the server defaults to 30 days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,
    /// Price paid in minor units; the server defaults to the list price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    /// Renew automatically at the end of the period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renew: Option<bool>,
}

/// A venue that failed during a sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueFailure {
    /// The venue.
    pub venue_id: VenueId,
    /// Sweep phase that failed: `expiry`, `grace_expiry` or `counter_reset`.
    pub phase: String,
    /// What went wrong.
    pub message: String,
}

/// Result of one tariff sweep.
#[derive(Debug, Clone, Deserialize)]
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
    /// Venues that could not be processed.
    pub errors: Vec<VenueFailure>,
}

/// Result of one session cleanup.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CleanupSummary {
    /// Sessions deleted.
    pub deleted: u64,
}

/// Service health.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// `ok` or `unavailable`.
    pub storage: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenSessionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpgradeRequest {
    pub tier: PaidTier,
    pub duration_days: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterVenueRequest {
    pub venue_id: VenueId,
}

/// API error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
