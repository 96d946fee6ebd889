//! Tariff history ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tariff::Tier;
use crate::{HistoryEntryId, VenueId};

/// One tier period of a venue.
///
/// Entries are append-only. An entry with `ended_at == None` is the venue's
/// current period; there is at most one per venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffHistoryEntry {
    /// Entry id (time-ordered).
    pub id: HistoryEntryId,
    /// Owning venue.
    pub venue_id: VenueId,
    /// Tier held during the period.
    pub tier: Tier,
    /// Period start.
    pub started_at: DateTime<Utc>,
    /// Period end; `None` while the period is open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Price of the period, absent on FREE.
    pub price_minor: Option<i64>,
    /// Whether the period was opened by an automatic renewal.
    pub auto_renewed: bool,
}

impl TariffHistoryEntry {
    /// Open a new period starting at `at`.
    #[must_use]
    pub fn open(
        venue_id: VenueId,
        tier: Tier,
        price_minor: Option<i64>,
        auto_renewed: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HistoryEntryId::generate(),
            venue_id,
            tier,
            started_at: at,
            ended_at: None,
            price_minor,
            auto_renewed,
        }
    }

    /// Whether this is the venue's current period.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Checks that a venue's ledger is gap-free.
///
/// Entries must be ordered by `started_at`; exactly the last one is open and
/// each closed entry ends where the next one starts.
#[must_use]
pub fn is_continuous(entries: &[TariffHistoryEntry]) -> bool {
    let Some((last, closed)) = entries.split_last() else {
        return true;
    };
    if !last.is_open() {
        return false;
    }
    closed
        .iter()
        .zip(entries.iter().skip(1))
        .all(|(prev, next)| prev.ended_at == Some(next.started_at))
}
