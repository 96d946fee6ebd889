//! Storage layer for kidsguide.
//!
//! This crate persists three kinds of records:
//!
//! - venue entitlements, one per venue
//! - the append-only tariff history ledger, many entries per venue
//! - login sessions, one per login
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local, used in development and tests. It can
//!   simulate outages and per-venue write failures.
//! - [`PgStore`]: PostgreSQL through `sqlx`, with embedded migrations.
//! - `RocksStore`: `RocksDB` with CBOR values, behind the `rocksdb-backend`
//!   feature.
//!
//! # Atomicity
//!
//! [`Store::transition_entitlement`] is the only way tier transitions are
//! written. It re-reads the record inside a per-venue exclusive section,
//! re-runs the caller's planner against that fresh record and writes the new
//! record together with the ledger rollover, or nothing at all.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use kidsguide_core::{TariffHistoryEntry, Tier, VenueEntitlement, VenueId};
//! use kidsguide_store::{MemoryStore, Store};
//!
//! # async fn example() -> kidsguide_store::Result<()> {
//! let store = MemoryStore::new();
//! let now = Utc::now();
//! let venue_id = VenueId::generate();
//!
//! let entitlement = VenueEntitlement::new_free(venue_id, now);
//! let opening = TariffHistoryEntry::open(venue_id, Tier::Free, None, false, now);
//! store.create_entitlement(&entitlement, &opening).await?;
//!
//! assert!(store.get_entitlement(&venue_id).await?.is_some());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kidsguide_core::{
    EntitlementChange, Session, SessionId, TariffHistoryEntry, UserId, VenueEntitlement, VenueId,
};

/// Plans a change from the current record, or `None` when nothing is due.
pub type Planner<'a> = dyn Fn(&VenueEntitlement) -> Option<EntitlementChange> + Send + Sync + 'a;

/// The storage trait defining all database operations.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    /// Insert a new entitlement together with its first ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the venue already has one.
    async fn create_entitlement(
        &self,
        entitlement: &VenueEntitlement,
        opening: &TariffHistoryEntry,
    ) -> Result<()>;

    /// Get the entitlement of a venue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_entitlement(&self, venue_id: &VenueId) -> Result<Option<VenueEntitlement>>;

    /// Overwrite an existing entitlement without touching the ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the venue has no entitlement.
    async fn update_entitlement(&self, entitlement: &VenueEntitlement) -> Result<()>;

    /// List every entitlement on a paid tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_paid_entitlements(&self) -> Result<Vec<VenueEntitlement>>;

    // =========================================================================
    // Tariff History Operations
    // =========================================================================

    /// Append a ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` when appending an open entry while
    /// the venue already has one.
    async fn append_history(&self, entry: &TariffHistoryEntry) -> Result<()>;

    /// Close the venue's open ledger entry at `ended_at`.
    ///
    /// Returns whether an open entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn close_open_history(&self, venue_id: &VenueId, ended_at: DateTime<Utc>) -> Result<bool>;

    /// List a venue's ledger ordered by `started_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_history(&self, venue_id: &VenueId) -> Result<Vec<TariffHistoryEntry>>;

    /// Get the venue's open ledger entry, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn open_history(&self, venue_id: &VenueId) -> Result<Option<TariffHistoryEntry>> {
        Ok(self
            .list_history(venue_id)
            .await?
            .into_iter()
            .find(TariffHistoryEntry::is_open))
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Apply a planned transition to one venue atomically.
    ///
    /// The planner runs against the record as it is inside the exclusive
    /// section. Returns the applied change, or `None` if the planner found
    /// nothing due.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the venue has no entitlement.
    /// - Any backend error; in that case nothing was written.
    async fn transition_entitlement(
        &self,
        venue_id: &VenueId,
        planner: &Planner<'_>,
    ) -> Result<Option<EntitlementChange>>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Insert a session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the session id is taken.
    async fn put_session(&self, session: &Session) -> Result<()>;

    /// Get a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Replace the refresh digest if it still equals `expected_digest`.
    ///
    /// Returns `false` when the session is gone or was already rotated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn rotate_refresh_token(
        &self,
        session_id: &SessionId,
        expected_digest: &str,
        new_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a session. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_session(&self, session_id: &SessionId) -> Result<bool>;

    /// Delete every session of a user. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64>;

    /// Delete sessions with `expires_at <= now`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    // =========================================================================
    // Health
    // =========================================================================

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if it is not.
    async fn ping(&self) -> Result<()>;
}
