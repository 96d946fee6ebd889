//! Venue tariff handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use kidsguide_core::{quote, EntitlementView, PaidTier, TariffHistoryEntry, VenueId};

use crate::auth::SessionAuth;
use crate::error::ApiError;
use crate::handlers::parse_venue_id;
use crate::state::AppState;

/// Tariff history response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Venue.
    pub venue_id: VenueId,
    /// The period in effect now.
    pub current: Option<TariffHistoryEntry>,
    /// All periods ordered by start.
    pub entries: Vec<TariffHistoryEntry>,
}

/// Upgrade request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    /// Paid tier name.
    pub tier: String,
    /// Period length in days.
    pub duration_days: i64,
}

/// Payment intent handed to the payment provider.
#[derive(Debug, Serialize)]
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
    /// Price before the long-term discount, in minor units.
    pub base_amount: i64,
    /// Long-term discount applied.
    pub discount_percent: u8,
    /// Currency code.
    pub currency: String,
    /// Human-readable purchase description.
    pub description: String,
}

/// Get a venue's current tariff.
///
/// A venue without a record is FREE. When storage cannot be read the FREE
/// view is returned with `degraded` set instead of an error.
pub async fn get_tariff(
    State(state): State<Arc<AppState>>,
    _auth: SessionAuth,
    Path(venue_id): Path<String>,
) -> Result<Json<EntitlementView>, ApiError> {
    let venue_id = parse_venue_id(&venue_id)?;
    let now = state.now();

    let view = match state.store.get_entitlement(&venue_id).await {
        Ok(Some(entitlement)) => EntitlementView::from_entitlement(&entitlement, now, &state.policy),
        Ok(None) => EntitlementView::free(venue_id, now, false),
        Err(e) => {
            tracing::warn!(venue_id = %venue_id, error = %e, "Entitlement read failed - reporting FREE");
            EntitlementView::free(venue_id, now, true)
        }
    };

    Ok(Json(view))
}

/// List a venue's tariff periods.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    _auth: SessionAuth,
    Path(venue_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let venue_id = parse_venue_id(&venue_id)?;

    let entries = state.store.list_history(&venue_id).await?;
    let current = state.store.open_history(&venue_id).await?;

    Ok(Json(HistoryResponse {
        venue_id,
        current,
        entries,
    }))
}

/// Price an upgrade and describe the payment to collect.
///
/// Nothing is written; the tier changes only after the payment is confirmed
/// through the admin endpoint.
pub async fn request_upgrade(
    State(state): State<Arc<AppState>>,
    auth: SessionAuth,
    Path(venue_id): Path<String>,
    Json(body): Json<UpgradeRequest>,
) -> Result<Json<PaymentIntent>, ApiError> {
    let venue_id = parse_venue_id(&venue_id)?;
    let tier: PaidTier = body.tier.parse()?;
    let price = quote(tier, body.duration_days)?;

    tracing::info!(
        venue_id = %venue_id,
        user_id = %auth.user_id,
        tier = %tier.tier(),
        duration_days = price.duration_days,
        amount = price.amount_minor,
        "Upgrade quoted"
    );

    Ok(Json(PaymentIntent {
        venue_id,
        tier,
        duration_days: price.duration_days,
        amount: price.amount_minor,
        base_amount: price.base_minor,
        discount_percent: price.discount_percent,
        currency: state.config.currency.clone(),
        description: format!("{} tariff for {} days", tier.tier(), price.duration_days),
    }))
}
