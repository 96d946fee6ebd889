//! Admin handlers.
//!
//! Venue registration and the payment-confirmed tier change. These are the
//! only request paths that write entitlements.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;

use kidsguide_core::transition::{plan_activation, plan_cancellation};
use kidsguide_core::{
    quote, EntitlementView, TariffError, TariffHistoryEntry, Tier, VenueEntitlement, VenueId,
};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::parse_venue_id;
use crate::state::AppState;

/// Default paid period when the request does not name one.
const DEFAULT_DURATION_DAYS: i64 = 30;

/// Register venue request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVenueRequest {
    /// The new venue.
    pub venue_id: VenueId,
}

/// Set tariff request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTariffRequest {
    /// Target tier; FREE cancels the paid period.
    pub tier: String,
    /// Paid period length (default 30).
    pub duration_days: Option<i64>,
    /// Price paid in minor units (default: the list price).
    pub price: Option<i64>,
    /// Renew automatically when the period ends.
    pub auto_renew: Option<bool>,
}

/// Register a venue on the FREE tier.
pub async fn register_venue(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<RegisterVenueRequest>,
) -> Result<(StatusCode, Json<EntitlementView>), ApiError> {
    let now = state.now();
    let entitlement = VenueEntitlement::new_free(body.venue_id, now);
    let opening = TariffHistoryEntry::open(body.venue_id, Tier::Free, None, false, now);

    state.store.create_entitlement(&entitlement, &opening).await?;

    tracing::info!(admin_id = %auth.admin_id, venue_id = %body.venue_id, "Venue registered");

    Ok((
        StatusCode::CREATED,
        Json(EntitlementView::from_entitlement(&entitlement, now, &state.policy)),
    ))
}

/// Apply a confirmed tier change.
///
/// A paid tier starts a new period, extending an unexpired period of the same
/// tier. FREE ends the paid period immediately and is a no-op on a FREE venue.
pub async fn set_tariff(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(venue_id): Path<String>,
    Json(body): Json<SetTariffRequest>,
) -> Result<Json<EntitlementView>, ApiError> {
    let venue_id = parse_venue_id(&venue_id)?;
    let tier: Tier = body.tier.parse()?;
    let now = state.now();

    let change = match tier.paid() {
        None => {
            state
                .store
                .transition_entitlement(&venue_id, &|current| plan_cancellation(current, now))
                .await?
        }
        Some(paid) => {
            let duration_days = body.duration_days.unwrap_or(DEFAULT_DURATION_DAYS);
            let list_price = quote(paid, duration_days)?;
            let price = body.price.unwrap_or(list_price.amount_minor);
            if price < 0 {
                return Err(TariffError::InvalidPrice(price).into());
            }
            let auto_renew = body.auto_renew.unwrap_or(false);

            state
                .store
                .transition_entitlement(&venue_id, &|current| {
                    Some(plan_activation(
                        current,
                        paid,
                        Duration::days(duration_days),
                        price,
                        auto_renew,
                        now,
                    ))
                })
                .await?
        }
    };

    let entitlement = match change {
        Some(change) => {
            tracing::info!(
                admin_id = %auth.admin_id,
                venue_id = %venue_id,
                transition = ?change.kind,
                tier = %change.updated.tier(),
                expires_at = ?change.updated.expires_at(),
                "Tariff changed"
            );
            change.updated
        }
        None => state
            .store
            .get_entitlement(&venue_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("venue not found: {venue_id}")))?,
    };

    Ok(Json(EntitlementView::from_entitlement(&entitlement, now, &state.policy)))
}
