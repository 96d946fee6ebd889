//! In-memory storage implementation.
//!
//! All records sit behind one `tokio::sync::RwLock`, so every write,
//! including a transition with its ledger rollover, is a single critical
//! section. Outages and per-venue write failures can be switched on to
//! exercise the error paths of callers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use kidsguide_core::{
    EntitlementChange, Session, SessionId, TariffHistoryEntry, UserId, VenueEntitlement, VenueId,
};

use crate::error::{Result, StoreError};
use crate::{Planner, Store};

#[derive(Default)]
struct Inner {
    entitlements: HashMap<VenueId, VenueEntitlement>,
    history: HashMap<VenueId, Vec<TariffHistoryEntry>>,
    sessions: HashMap<SessionId, Session>,
    failing_venues: HashSet<VenueId>,
}

impl Inner {
    fn append(&mut self, entry: &TariffHistoryEntry) -> Result<()> {
        let ledger = self.history.entry(entry.venue_id).or_default();
        if entry.is_open() && ledger.iter().any(TariffHistoryEntry::is_open) {
            return Err(StoreError::AlreadyExists {
                entity: "open tariff period",
                id: entry.venue_id.to_string(),
            });
        }
        ledger.push(entry.clone());
        Ok(())
    }

    fn close_open(&mut self, venue_id: &VenueId, ended_at: DateTime<Utc>) -> bool {
        self.history
            .get_mut(venue_id)
            .and_then(|ledger| ledger.iter_mut().find(|e| e.is_open()))
            .map(|open| open.ended_at = Some(ended_at))
            .is_some()
    }

    fn check_writable(&self, venue_id: &VenueId) -> Result<()> {
        if self.failing_venues.contains(venue_id) {
            return Err(StoreError::Database(format!(
                "write rejected for venue {venue_id}"
            )));
        }
        Ok(())
    }
}

/// Process-local storage backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes to one venue fail with `StoreError::Database`.
    pub async fn fail_venue_writes(&self, venue_id: VenueId) {
        self.inner.write().await.failing_venues.insert(venue_id);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    async fn create_entitlement(
        &self,
        entitlement: &VenueEntitlement,
        opening: &TariffHistoryEntry,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        let venue_id = entitlement.venue_id;
        inner.check_writable(&venue_id)?;

        if inner.entitlements.contains_key(&venue_id) {
            return Err(StoreError::AlreadyExists {
                entity: "entitlement",
                id: venue_id.to_string(),
            });
        }
        inner.append(opening)?;
        inner.entitlements.insert(venue_id, entitlement.clone());
        Ok(())
    }

    async fn get_entitlement(&self, venue_id: &VenueId) -> Result<Option<VenueEntitlement>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.entitlements.get(venue_id).cloned())
    }

    async fn update_entitlement(&self, entitlement: &VenueEntitlement) -> Result<()> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        inner.check_writable(&entitlement.venue_id)?;

        let slot = inner
            .entitlements
            .get_mut(&entitlement.venue_id)
            .ok_or_else(|| StoreError::venue_not_found(&entitlement.venue_id))?;
        *slot = entitlement.clone();
        Ok(())
    }

    async fn list_paid_entitlements(&self) -> Result<Vec<VenueEntitlement>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        let mut paid: Vec<_> = inner
            .entitlements
            .values()
            .filter(|e| e.is_paid())
            .cloned()
            .collect();
        paid.sort_by_key(|e| e.venue_id);
        Ok(paid)
    }

    // =========================================================================
    // Tariff History Operations
    // =========================================================================

    async fn append_history(&self, entry: &TariffHistoryEntry) -> Result<()> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        inner.check_writable(&entry.venue_id)?;
        inner.append(entry)
    }

    async fn close_open_history(&self, venue_id: &VenueId, ended_at: DateTime<Utc>) -> Result<bool> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        inner.check_writable(venue_id)?;
        Ok(inner.close_open(venue_id, ended_at))
    }

    async fn list_history(&self, venue_id: &VenueId) -> Result<Vec<TariffHistoryEntry>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        let mut ledger = inner.history.get(venue_id).cloned().unwrap_or_default();
        ledger.sort_by_key(|e| (e.started_at, e.id));
        Ok(ledger)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn transition_entitlement(
        &self,
        venue_id: &VenueId,
        planner: &Planner<'_>,
    ) -> Result<Option<EntitlementChange>> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;

        let current = inner
            .entitlements
            .get(venue_id)
            .ok_or_else(|| StoreError::venue_not_found(venue_id))?;
        let Some(change) = planner(current) else {
            return Ok(None);
        };
        inner.check_writable(venue_id)?;

        // Validate the rollover before mutating anything.
        if let Some(rollover) = &change.rollover {
            if rollover.opened.venue_id != *venue_id {
                return Err(StoreError::Database(format!(
                    "ledger entry for venue {} in transition of {venue_id}",
                    rollover.opened.venue_id
                )));
            }
            inner.close_open(venue_id, rollover.at);
            inner.append(&rollover.opened)?;
        }
        inner.entitlements.insert(*venue_id, change.updated.clone());
        Ok(Some(change))
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.session_id) {
            return Err(StoreError::AlreadyExists {
                entity: "session",
                id: session.session_id.to_string(),
            });
        }
        inner.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.sessions.get(session_id).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        session_id: &SessionId,
        expected_digest: &str,
        new_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(session) if session.refresh_token_digest == expected_digest => {
                session.refresh_token_digest = new_digest.to_string();
                session.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.inner.write().await.sessions.remove(session_id).is_some())
    }

    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.user_id != *user_id);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        self.ensure_available()?;
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - inner.sessions.len()) as u64)
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn ping(&self) -> Result<()> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kidsguide_core::history::is_continuous;
    use kidsguide_core::transition::{plan_activation, plan_cancellation, plan_expiry};
    use kidsguide_core::{PaidTier, TariffPolicy, Tier};

    async fn store_with_free_venue(now: DateTime<Utc>) -> (MemoryStore, VenueId) {
        let store = MemoryStore::new();
        let venue_id = VenueId::generate();
        store
            .create_entitlement(
                &VenueEntitlement::new_free(venue_id, now),
                &TariffHistoryEntry::open(venue_id, Tier::Free, None, false, now),
            )
            .await
            .unwrap();
        (store, venue_id)
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;
        let result = store
            .create_entitlement(
                &VenueEntitlement::new_free(venue_id, now),
                &TariffHistoryEntry::open(venue_id, Tier::Free, None, false, now),
            )
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(store.list_history(&venue_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_rolls_the_ledger_over() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;
        let later = now + Duration::hours(1);

        let applied = store
            .transition_entitlement(&venue_id, &|current| {
                Some(plan_activation(current, PaidTier::Super, Duration::days(30), 99_000, false, later))
            })
            .await
            .unwrap();
        assert!(applied.is_some());

        let ledger = store.list_history(&venue_id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].ended_at, Some(later));
        assert_eq!(ledger[1].tier, Tier::Super);
        assert!(is_continuous(&ledger));
        assert_eq!(store.list_paid_entitlements().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn planner_sees_fresh_record() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;

        // FREE venue: nothing to cancel, nothing written.
        let applied = store
            .transition_entitlement(&venue_id, &|current| plan_cancellation(current, now))
            .await
            .unwrap();
        assert!(applied.is_none());

        // A paid period that lapsed enters grace once; the second attempt
        // re-plans against the stored grace window and does nothing.
        store
            .transition_entitlement(&venue_id, &|current| {
                Some(plan_activation(current, PaidTier::Super, Duration::days(1), 3_300, false, now))
            })
            .await
            .unwrap();
        let policy = TariffPolicy::default();
        let at = now + Duration::days(2);
        let first = store
            .transition_entitlement(&venue_id, &|current| plan_expiry(current, at, &policy))
            .await
            .unwrap();
        let second = store
            .transition_entitlement(&venue_id, &|current| plan_expiry(current, at, &policy))
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_state() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;
        store.fail_venue_writes(venue_id).await;

        let result = store
            .transition_entitlement(&venue_id, &|current| {
                Some(plan_activation(current, PaidTier::Maximum, Duration::days(30), 1, false, now))
            })
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(
            store.get_entitlement(&venue_id).await.unwrap().unwrap().tier(),
            Tier::Free
        );
        assert_eq!(store.list_history(&venue_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;
        store.set_unavailable(true);

        assert!(matches!(
            store.get_entitlement(&venue_id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());
        assert!(store.delete_expired_sessions(now).await.unwrap_err().is_retryable());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn primitive_history_operations() {
        let now = Utc::now();
        let (store, venue_id) = store_with_free_venue(now).await;

        let second = TariffHistoryEntry::open(venue_id, Tier::Super, Some(10), false, now);
        assert!(matches!(
            store.append_history(&second).await,
            Err(StoreError::AlreadyExists { .. })
        ));

        assert!(store.close_open_history(&venue_id, now).await.unwrap());
        assert!(!store.close_open_history(&venue_id, now).await.unwrap());
        store.append_history(&second).await.unwrap();

        let mut ent = store.get_entitlement(&venue_id).await.unwrap().unwrap();
        ent.monthly_news_count = 3;
        store.update_entitlement(&ent).await.unwrap();
        assert_eq!(
            store.get_entitlement(&venue_id).await.unwrap().unwrap().monthly_news_count,
            3
        );
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let live = Session::new(SessionId::generate(), user_id, "a".into(), now, Duration::days(7));
        let stale = Session::new(SessionId::generate(), user_id, "b".into(), now - Duration::days(8), Duration::days(7));
        store.put_session(&live).await.unwrap();
        store.put_session(&stale).await.unwrap();

        let same_id = Session::new(live.session_id, user_id, "e".into(), now, Duration::days(7));
        assert!(matches!(
            store.put_session(&same_id).await,
            Err(StoreError::AlreadyExists { .. })
        ));

        assert!(store.rotate_refresh_token(&live.session_id, "a", "c", now).await.unwrap());
        assert!(!store.rotate_refresh_token(&live.session_id, "a", "d", now).await.unwrap());

        assert_eq!(store.delete_expired_sessions(now).await.unwrap(), 1);
        assert!(store.get_session(&stale.session_id).await.unwrap().is_none());
        assert!(store.delete_session(&live.session_id).await.unwrap());
        assert!(!store.delete_session(&live.session_id).await.unwrap());
    }
}
