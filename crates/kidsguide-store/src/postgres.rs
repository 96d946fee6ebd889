//! PostgreSQL storage implementation.
//!
//! Transitions run in one transaction that locks the venue row with
//! `SELECT ... FOR UPDATE`, so a sweep and a concurrent admin change on the
//! same venue are serialized while other venues proceed in parallel. The
//! partial unique index on `tariff_history (venue_id) WHERE ended_at IS NULL`
//! backs the one-open-period rule.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use uuid::Uuid;

use kidsguide_core::{
    EntitlementChange, HistoryEntryId, PaidTariff, Session, SessionId, TariffHistoryEntry,
    TariffPlan, Tier, UserId, VenueEntitlement, VenueId,
};

use crate::error::{Result, StoreError};
use crate::{Planner, Store};

const ENTITLEMENT_COLUMNS: &str = "venue_id, tier, expires_at, auto_renew, grace_period_ends_at, \
     price_minor, monthly_news_count, counter_reset_at, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, venue_id, tier, started_at, ended_at, price_minor, auto_renewed";

const SESSION_COLUMNS: &str =
    "session_id, user_id, refresh_token_digest, expires_at, created_at, updated_at";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if no connection can be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct EntitlementRow {
    venue_id: Uuid,
    tier: String,
    expires_at: Option<DateTime<Utc>>,
    auto_renew: bool,
    grace_period_ends_at: Option<DateTime<Utc>>,
    price_minor: Option<i64>,
    monthly_news_count: i32,
    counter_reset_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for VenueEntitlement {
    type Error = StoreError;

    fn try_from(row: EntitlementRow) -> Result<Self> {
        let tier: Tier = row
            .tier
            .parse()
            .map_err(|e: kidsguide_core::TariffError| StoreError::Serialization(e.to_string()))?;

        let plan = match tier.paid() {
            None => TariffPlan::Free,
            Some(paid_tier) => {
                let (Some(expires_at), Some(price_minor)) = (row.expires_at, row.price_minor) else {
                    return Err(StoreError::Serialization(format!(
                        "paid entitlement {} without period",
                        row.venue_id
                    )));
                };
                TariffPlan::Paid(PaidTariff {
                    tier: paid_tier,
                    expires_at,
                    auto_renew: row.auto_renew,
                    grace_period_ends_at: row.grace_period_ends_at,
                    price_minor,
                })
            }
        };

        Ok(Self {
            venue_id: VenueId::from_uuid(row.venue_id),
            plan,
            monthly_news_count: u32::try_from(row.monthly_news_count)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            counter_reset_at: row.counter_reset_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    venue_id: Uuid,
    tier: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    price_minor: Option<i64>,
    auto_renewed: bool,
}

impl TryFrom<HistoryRow> for TariffHistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .parse::<HistoryEntryId>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            venue_id: VenueId::from_uuid(row.venue_id),
            tier: row
                .tier
                .parse()
                .map_err(|e: kidsguide_core::TariffError| StoreError::Serialization(e.to_string()))?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            price_minor: row.price_minor,
            auto_renewed: row.auto_renewed,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    refresh_token_digest: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: SessionId::from_uuid(row.session_id),
            user_id: UserId::from_uuid(row.user_id),
            refresh_token_digest: row.refresh_token_digest,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists {
            entity: "row",
            id: db.constraint().unwrap_or("unique").to_string(),
        },
        other => StoreError::Database(other.to_string()),
    }
}

// ============================================================================
// Statements shared by plain and transactional paths
// ============================================================================

async fn write_entitlement(conn: &mut PgConnection, ent: &VenueEntitlement) -> Result<u64> {
    let paid = ent.paid();
    let count = i32::try_from(ent.monthly_news_count)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let result = sqlx::query(
        "UPDATE venue_entitlements SET tier = $2, expires_at = $3, auto_renew = $4, \
         grace_period_ends_at = $5, price_minor = $6, monthly_news_count = $7, \
         counter_reset_at = $8, updated_at = $9 WHERE venue_id = $1",
    )
    .bind(ent.venue_id.as_uuid())
    .bind(ent.tier().as_str())
    .bind(paid.map(|p| p.expires_at))
    .bind(ent.auto_renew())
    .bind(paid.and_then(|p| p.grace_period_ends_at))
    .bind(paid.map(|p| p.price_minor))
    .bind(count)
    .bind(ent.counter_reset_at)
    .bind(ent.updated_at)
    .execute(conn)
    .await
    .map_err(map_err)?;
    Ok(result.rows_affected())
}

async fn insert_history(conn: &mut PgConnection, entry: &TariffHistoryEntry) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO tariff_history ({HISTORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
    ))
    .bind(entry.id.to_string())
    .bind(entry.venue_id.as_uuid())
    .bind(entry.tier.as_str())
    .bind(entry.started_at)
    .bind(entry.ended_at)
    .bind(entry.price_minor)
    .bind(entry.auto_renewed)
    .execute(conn)
    .await
    .map_err(map_err)?;
    Ok(())
}

async fn close_open(conn: &mut PgConnection, venue_id: &VenueId, ended_at: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tariff_history SET ended_at = $2 WHERE venue_id = $1 AND ended_at IS NULL",
    )
    .bind(venue_id.as_uuid())
    .bind(ended_at)
    .execute(conn)
    .await
    .map_err(map_err)?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Entitlement Operations
    // =========================================================================

    async fn create_entitlement(
        &self,
        entitlement: &VenueEntitlement,
        opening: &TariffHistoryEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let inserted = sqlx::query(
            "INSERT INTO venue_entitlements (venue_id, tier, created_at, updated_at) \
             VALUES ($1, 'FREE', $2, $2) ON CONFLICT (venue_id) DO NOTHING",
        )
        .bind(entitlement.venue_id.as_uuid())
        .bind(entitlement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists {
                entity: "entitlement",
                id: entitlement.venue_id.to_string(),
            });
        }

        write_entitlement(&mut tx, entitlement).await?;
        insert_history(&mut tx, opening).await?;
        tx.commit().await.map_err(map_err)
    }

    async fn get_entitlement(&self, venue_id: &VenueId) -> Result<Option<VenueEntitlement>> {
        sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM venue_entitlements WHERE venue_id = $1"
        ))
        .bind(venue_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .map(VenueEntitlement::try_from)
        .transpose()
    }

    async fn update_entitlement(&self, entitlement: &VenueEntitlement) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_err)?;
        if write_entitlement(&mut conn, entitlement).await? == 0 {
            return Err(StoreError::venue_not_found(&entitlement.venue_id));
        }
        Ok(())
    }

    async fn list_paid_entitlements(&self) -> Result<Vec<VenueEntitlement>> {
        sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM venue_entitlements WHERE tier <> 'FREE' ORDER BY venue_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?
        .into_iter()
        .map(VenueEntitlement::try_from)
        .collect()
    }

    // =========================================================================
    // Tariff History Operations
    // =========================================================================

    async fn append_history(&self, entry: &TariffHistoryEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_err)?;
        insert_history(&mut conn, entry).await
    }

    async fn close_open_history(&self, venue_id: &VenueId, ended_at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(map_err)?;
        close_open(&mut conn, venue_id, ended_at).await
    }

    async fn list_history(&self, venue_id: &VenueId) -> Result<Vec<TariffHistoryEntry>> {
        sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM tariff_history WHERE venue_id = $1 ORDER BY started_at, id"
        ))
        .bind(venue_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?
        .into_iter()
        .map(TariffHistoryEntry::try_from)
        .collect()
    }

    async fn open_history(&self, venue_id: &VenueId) -> Result<Option<TariffHistoryEntry>> {
        sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {HISTORY_COLUMNS} FROM tariff_history WHERE venue_id = $1 AND ended_at IS NULL"
        ))
        .bind(venue_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .map(TariffHistoryEntry::try_from)
        .transpose()
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn transition_entitlement(
        &self,
        venue_id: &VenueId,
        planner: &Planner<'_>,
    ) -> Result<Option<EntitlementChange>> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let row = sqlx::query_as::<_, EntitlementRow>(&format!(
            "SELECT {ENTITLEMENT_COLUMNS} FROM venue_entitlements WHERE venue_id = $1 FOR UPDATE"
        ))
        .bind(venue_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?
        .ok_or_else(|| StoreError::venue_not_found(venue_id))?;
        let current = VenueEntitlement::try_from(row)?;

        let Some(change) = planner(&current) else {
            tx.rollback().await.map_err(map_err)?;
            return Ok(None);
        };

        write_entitlement(&mut tx, &change.updated).await?;
        if let Some(rollover) = &change.rollover {
            close_open(&mut tx, venue_id, rollover.at).await?;
            insert_history(&mut tx, &rollover.opened).await?;
        }
        tx.commit().await.map_err(map_err)?;

        Ok(Some(change))
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    async fn put_session(&self, session: &Session) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(session.session_id.as_uuid())
        .bind(session.user_id.as_uuid())
        .bind(&session.refresh_token_digest)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        Ok(sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .map(Session::from))
    }

    async fn rotate_refresh_token(
        &self,
        session_id: &SessionId,
        expected_digest: &str,
        new_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET refresh_token_digest = $3, updated_at = $4 \
             WHERE session_id = $1 AND refresh_token_digest = $2",
        )
        .bind(session_id.as_uuid())
        .bind(expected_digest)
        .bind(new_digest)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(session_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_sessions(&self, user_id: &UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Health
    // =========================================================================

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
