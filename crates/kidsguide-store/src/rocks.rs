//! `RocksDB` storage implementation.
//!
//! Values are CBOR. Every read-modify-write runs under one async mutex and
//! commits through a single `WriteBatch`, so an entitlement and its ledger
//! rollover land together or not at all.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tokio::sync::Mutex;

use kidsguide_core::{
    EntitlementChange, Session, SessionId, TariffHistoryEntry, UserId, VenueEntitlement, VenueId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Planner, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_entitlement(&self, venue_id: &VenueId) -> Result<Option<VenueEntitlement>> {
        let cf = self.cf(cf::ENTITLEMENTS)?;
        self.db
            .get_cf(&cf, keys::entitlement_key(venue_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn read_history(&self, venue_id: &VenueId) -> Result<Vec<TariffHistoryEntry>> {
        let cf = self.cf(cf::TARIFF_HISTORY)?;
        let prefix = keys::history_prefix(venue_id);
        let mut entries = Vec::new();

        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(Self::deserialize::<TariffHistoryEntry>(&value)?);
        }
        Ok(entries)
    }

    fn read_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let cf = self.cf(cf::SESSIONS)?;
        self.db
            .get_cf(&cf, keys::session_key(session_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn all_sessions(&self) -> Result<Vec<Session>> {
        let cf = self.cf(cf::SESSIONS)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                Self::deserialize(&value)
            })
            .collect()
    }

    /// Stage closing the open entry and appending `opened` into `batch`.
    fn stage_rollover(
        &self,
        batch: &mut WriteBatch,
        venue_id: &VenueId,
        at: DateTime<Utc>,
        opened: Option<&TariffHistoryEntry>,
    ) -> Result<()> {
        let cf = self.cf(cf::TARIFF_HISTORY)?;
        if let Some(mut open) = self.read_history(venue_id)?.into_iter().find(TariffHistoryEntry::is_open) {
            open.ended_at = Some(at);
            batch.put_cf(&cf, keys::history_key(venue_id, &open.id), Self::serialize(&open)?);
        }
        if let Some(entry) = opened {
            batch.put_cf(&cf, keys::history_key(venue_id, &entry.id), Self::serialize(entry)?);
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn delete_sessions_where(&self, predicate: impl Fn(&Session) -> bool) -> Result<u64> {
        let cf = self.cf(cf::SESSIONS)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for session in self.all_sessions()?.iter().filter(|s| predicate(*s)) {
            batch.delete_cf(&cf, keys::session_key(&session.session_id));
            removed += 1;
        }
        self.write(batch)?;
        Ok(removed)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    async fn create_entitlement(
        &self,
        entitlement: &VenueEntitlement,
        opening: &TariffHistoryEntry,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let venue_id = entitlement.venue_id;
        if self.read_entitlement(&venue_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "entitlement",
                id: venue_id.to_string(),
            });
        }

        let cf_ent = self.cf(cf::ENTITLEMENTS)?;
        let cf_hist = self.cf(cf::TARIFF_HISTORY)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_ent, keys::entitlement_key(&venue_id), Self::serialize(entitlement)?);
        batch.put_cf(&cf_hist, keys::history_key(&venue_id, &opening.id), Self::serialize(opening)?);
        self.write(batch)
    }

    async fn get_entitlement(&self, venue_id: &VenueId) -> Result<Option<VenueEntitlement>> {
        self.read_entitlement(venue_id)
    }

    async fn update_entitlement(&self, entitlement: &VenueEntitlement) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_entitlement(&entitlement.venue_id)?.is_none() {
            return Err(StoreError::venue_not_found(&entitlement.venue_id));
        }
        let cf = self.cf(cf::ENTITLEMENTS)?;
        self.db
            .put_cf(&cf, keys::entitlement_key(&entitlement.venue_id), Self::serialize(entitlement)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn list_paid_entitlements(&self) -> Result<Vec<VenueEntitlement>> {
        let cf = self.cf(cf::ENTITLEMENTS)?;
        let mut paid = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let entitlement: VenueEntitlement = Self::deserialize(&value)?;
            if entitlement.is_paid() {
                paid.push(entitlement);
            }
        }
        Ok(paid)
    }

    // =========================================================================
    // Tariff History Operations
    // =========================================================================

    async fn append_history(&self, entry: &TariffHistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if entry.is_open() && self.read_history(&entry.venue_id)?.iter().any(TariffHistoryEntry::is_open) {
            return Err(StoreError::AlreadyExists {
                entity: "open tariff period",
                id: entry.venue_id.to_string(),
            });
        }
        let cf = self.cf(cf::TARIFF_HISTORY)?;
        self.db
            .put_cf(&cf, keys::history_key(&entry.venue_id, &entry.id), Self::serialize(entry)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn close_open_history(&self, venue_id: &VenueId, ended_at: DateTime<Utc>) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let had_open = self.read_history(venue_id)?.iter().any(TariffHistoryEntry::is_open);
        let mut batch = WriteBatch::default();
        self.stage_rollover(&mut batch, venue_id, ended_at, None)?;
        self.write(batch)?;
        Ok(had_open)
    }

    async fn list_history(&self, venue_id: &VenueId) -> Result<Vec<TariffHistoryEntry>> {
        let mut entries = self.read_history(venue_id)?;
        entries.sort_by_key(|e| (e.started_at, e.id));
        Ok(entries)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn transition_entitlement(
        &self,
        venue_id: &VenueId,
        planner: &Planner<'_>,
    ) -> Result<Option<EntitlementChange>> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .read_entitlement(venue_id)?
            .ok_or_else(|| StoreError::venue_not_found(venue_id))?;
        let Some(change) = planner(&current) else {
            return Ok(None);
        };

        let cf = self.cf(cf::ENTITLEMENTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf, keys::entitlement_key(venue_id), Self::serialize(&change.updated)?);
        if let Some(rollover) = &change.rollover {
            self.stage_rollover(&mut batch, venue_id, rollover.at, Some(&rollover.opened))?;
        }
        self.write(batch)?;
        Ok(Some(change))
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_session(&session.session_id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "session",
                id: session.session_id.to_string(),
            });
        }
        let cf = self.cf(cf::SESSIONS)?;
        self.db
            .put_cf(&cf, keys::session_key(&session.session_id), Self::serialize(session)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        self.read_session(session_id)
    }

    async fn rotate_refresh_token(
        &self,
        session_id: &SessionId,
        expected_digest: &str,
        new_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut session) = self.read_session(session_id)? else {
            return Ok(false);
        };
        if session.refresh_token_digest != expected_digest {
            return Ok(false);
        }
        session.refresh_token_digest = new_digest.to_string();
        session.updated_at = now;
        let cf = self.cf(cf::SESSIONS)?;
        self.db
            .put_cf(&cf, keys::session_key(session_id), Self::serialize(&session)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existed = self.read_session(session_id)?.is_some();
        let cf = self.cf(cf::SESSIONS)?;
        self.db
            .delete_cf(&cf, keys::session_key(session_id))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(existed)
    }

    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        self.delete_sessions_where(|s| s.user_id == *user_id)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        self.delete_sessions_where(|s| s.is_expired(now))
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn ping(&self) -> Result<()> {
        self.cf(cf::ENTITLEMENTS).map(|_| ())
    }
}
