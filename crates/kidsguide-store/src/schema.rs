//! Column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Venue entitlements, keyed by `venue_id`.
    pub const ENTITLEMENTS: &str = "entitlements";

    /// Tariff history, keyed by `venue_id || entry_id` (ULID, time-ordered).
    pub const TARIFF_HISTORY: &str = "tariff_history";

    /// Login sessions, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::ENTITLEMENTS, cf::TARIFF_HISTORY, cf::SESSIONS]
}
