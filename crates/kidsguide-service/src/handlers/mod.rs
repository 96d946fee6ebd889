//! HTTP request handlers.

pub mod admin;
pub mod cron;
pub mod health;
pub mod sessions;
pub mod venues;

use kidsguide_core::{TariffError, VenueId};

use crate::error::ApiError;

/// Parse a venue id from a path segment.
pub(crate) fn parse_venue_id(raw: &str) -> Result<VenueId, ApiError> {
    raw.parse::<VenueId>()
        .map_err(|e| ApiError::from(TariffError::from(e)))
}
