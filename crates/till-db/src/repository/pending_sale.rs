//! # SQLite Queue Store
//!
//! [`LocalQueueStore`] on top of the `pending_sales` and `confirmed_sales`
//! tables.
//!
//! ## Completing a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. SELECT * FROM pending_sales WHERE id = ?                           │
//! │  2. PendingSale::apply(status = SUBMITTED)   ← invariant check         │
//! │  3. INSERT INTO confirmed_sales (..., sale_number, confirmed_at)       │
//! │  4. DELETE FROM pending_sales WHERE id = ?                             │
//! │                                                                         │
//! │  COMMIT ← the sale is in exactly one table, before and after           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use till_core::{
    Confirmation, ConfirmedSale, FailureKind, PendingSale, SalePatch, SalePayload, SaleStatus,
};

use crate::error::{DbError, DbResult};
use crate::store::LocalQueueStore;

const PENDING_COLUMNS: &str = "id, payload, created_at, status, attempts, last_error, \
     failure_kind, next_attempt_at, last_attempt_at";

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct PendingSaleRow {
    id: String,
    payload: String,
    created_at: DateTime<Utc>,
    status: SaleStatus,
    attempts: i64,
    last_error: Option<String>,
    failure_kind: Option<FailureKind>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<PendingSaleRow> for PendingSale {
    type Error = DbError;

    fn try_from(row: PendingSaleRow) -> DbResult<Self> {
        let payload: SalePayload = serde_json::from_str(&row.payload)
            .map_err(|e| DbError::corrupt(&row.id, e.to_string()))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| DbError::corrupt(&row.id, format!("attempts = {}", row.attempts)))?;

        Ok(PendingSale {
            id: row.id,
            payload,
            created_at: row.created_at,
            status: row.status,
            attempts,
            last_error: row.last_error,
            failure_kind: row.failure_kind,
            next_attempt_at: row.next_attempt_at,
            last_attempt_at: row.last_attempt_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ConfirmedSaleRow {
    id: String,
    payload: String,
    created_at: DateTime<Utc>,
    attempts: i64,
    last_attempt_at: Option<DateTime<Utc>>,
    sale_number: String,
    confirmed_at: DateTime<Utc>,
}

impl TryFrom<ConfirmedSaleRow> for ConfirmedSale {
    type Error = DbError;

    fn try_from(row: ConfirmedSaleRow) -> DbResult<Self> {
        let payload: SalePayload = serde_json::from_str(&row.payload)
            .map_err(|e| DbError::corrupt(&row.id, e.to_string()))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| DbError::corrupt(&row.id, format!("attempts = {}", row.attempts)))?;

        Ok(ConfirmedSale {
            sale: PendingSale {
                id: row.id,
                payload,
                created_at: row.created_at,
                status: SaleStatus::Submitted,
                attempts,
                last_error: None,
                failure_kind: None,
                next_attempt_at: None,
                last_attempt_at: row.last_attempt_at,
            },
            confirmation: Confirmation {
                sale_number: row.sale_number,
                confirmed_at: row.confirmed_at,
            },
        })
    }
}

// =============================================================================
// Store
// =============================================================================

/// Durable queue store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Creates a store over an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteQueueStore { pool }
    }

    async fn fetch_pending(
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
    ) -> DbResult<Option<PendingSale>> {
        let sql = format!("SELECT {} FROM pending_sales WHERE id = ?1", PENDING_COLUMNS);
        let row: Option<PendingSaleRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(PendingSale::try_from).transpose()
    }

    async fn id_known(tx: &mut Transaction<'_, Sqlite>, id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM pending_sales WHERE id = ?1)
                 + (SELECT COUNT(*) FROM confirmed_sales WHERE id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count > 0)
    }

    /// Counts active records.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl LocalQueueStore for SqliteQueueStore {
    async fn append(&self, sale: &PendingSale) -> DbResult<()> {
        let payload = serde_json::to_string(&sale.payload)?;

        let mut tx = self.pool.begin().await?;

        if Self::id_known(&mut tx, &sale.id).await? {
            return Err(DbError::duplicate(&sale.id));
        }

        sqlx::query(
            r#"
            INSERT INTO pending_sales (
                id, payload, created_at, status, attempts,
                last_error, failure_kind, next_attempt_at, last_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(&payload)
        .bind(sale.created_at)
        .bind(sale.status)
        .bind(i64::from(sale.attempts))
        .bind(&sale.last_error)
        .bind(sale.failure_kind)
        .bind(sale.next_attempt_at)
        .bind(sale.last_attempt_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(sale_id = %sale.id, status = %sale.status, "Sale appended to queue");
        Ok(())
    }

    async fn update(&self, id: &str, patch: &SalePatch) -> DbResult<PendingSale> {
        let mut tx = self.pool.begin().await?;

        let mut sale = Self::fetch_pending(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("PendingSale", id))?;

        sale.apply(patch)?;

        // Payload is never written here
        sqlx::query(
            r#"
            UPDATE pending_sales SET
                status = ?2,
                attempts = ?3,
                last_error = ?4,
                failure_kind = ?5,
                next_attempt_at = ?6,
                last_attempt_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(sale.status)
        .bind(i64::from(sale.attempts))
        .bind(&sale.last_error)
        .bind(sale.failure_kind)
        .bind(sale.next_attempt_at)
        .bind(sale.last_attempt_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            sale_id = %id,
            status = %sale.status,
            attempts = sale.attempts,
            "Sale updated"
        );
        Ok(sale)
    }

    async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM pending_sales WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(sale_id = %id, removed, "Sale removed from queue");
        Ok(removed)
    }

    async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM pending_sales")
            .execute(&self.pool)
            .await?;
        debug!(removed = result.rows_affected(), "Queue cleared");
        Ok(result.rows_affected())
    }

    async fn get(&self, id: &str) -> DbResult<Option<PendingSale>> {
        let sql = format!("SELECT {} FROM pending_sales WHERE id = ?1", PENDING_COLUMNS);
        let row: Option<PendingSaleRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PendingSale::try_from).transpose()
    }

    async fn list(&self) -> DbResult<Vec<PendingSale>> {
        let sql = format!("SELECT {} FROM pending_sales ORDER BY seq ASC", PENDING_COLUMNS);
        let rows: Vec<PendingSaleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(PendingSale::try_from).collect()
    }

    async fn complete(&self, id: &str, confirmation: &Confirmation) -> DbResult<ConfirmedSale> {
        let mut tx = self.pool.begin().await?;

        let mut sale = Self::fetch_pending(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found("PendingSale", id))?;

        sale.apply(&SalePatch::new().status(SaleStatus::Submitted))?;
        let payload = serde_json::to_string(&sale.payload)?;

        sqlx::query(
            r#"
            INSERT INTO confirmed_sales (
                id, payload, created_at, attempts, last_attempt_at,
                sale_number, confirmed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&sale.id)
        .bind(&payload)
        .bind(sale.created_at)
        .bind(i64::from(sale.attempts))
        .bind(sale.last_attempt_at)
        .bind(&confirmation.sale_number)
        .bind(confirmation.confirmed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pending_sales WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            sale_id = %id,
            sale_number = %confirmation.sale_number,
            "Sale moved to confirmed set"
        );

        Ok(ConfirmedSale {
            sale,
            confirmation: confirmation.clone(),
        })
    }

    async fn confirmed(&self, limit: u32) -> DbResult<Vec<ConfirmedSale>> {
        let rows: Vec<ConfirmedSaleRow> = sqlx::query_as(
            r#"
            SELECT id, payload, created_at, attempts, last_attempt_at,
                   sale_number, confirmed_at
            FROM confirmed_sales
            ORDER BY confirmed_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConfirmedSale::try_from).collect()
    }

    async fn prune_confirmed(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM confirmed_sales WHERE confirmed_at < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        debug!(pruned = result.rows_affected(), %cutoff, "Pruned confirmed sales");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use till_core::{SaleLine, SaleTotals};

    async fn store() -> SqliteQueueStore {
        Database::new(DbConfig::in_memory()).await.unwrap().queue()
    }

    fn sale(id: &str) -> PendingSale {
        let payload = SalePayload {
            customer: None,
            lines: vec![SaleLine {
                sku: "CHG-USBC".to_string(),
                name: "USB-C charger".to_string(),
                quantity: 1,
                unit_price_cents: 2500,
                discount_cents: 0,
            }],
            totals: SaleTotals {
                subtotal_cents: 2500,
                discount_cents: 0,
                tax_cents: 200,
                total_cents: 2700,
            },
            note: Some("gift".to_string()),
        };
        PendingSale::new(id, payload, Utc::now())
    }

    fn confirmation(number: &str) -> Confirmation {
        Confirmation {
            sale_number: number.to_string(),
            confirmed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_list_in_insertion_order() {
        let store = store().await;
        for id in ["c", "a", "b"] {
            store.append(&sale(id)).await.unwrap();
        }

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.count_pending().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_payload_round_trips() {
        let store = store().await;
        let original = sale("s1");
        store.append(&original).await.unwrap();

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.payload, original.payload);
        assert_eq!(loaded.status, SaleStatus::Queued);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();

        let err = store.append(&sale("s1")).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn test_confirmed_id_never_reused() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();
        store.complete("s1", &confirmation("S-1")).await.unwrap();

        let err = store.append(&sale("s1")).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();

        let next = Utc::now() + Duration::seconds(4);
        let updated = store
            .update(
                "s1",
                &SalePatch::new()
                    .status(SaleStatus::Retrying)
                    .attempts(1)
                    .error(FailureKind::Transient, "connection reset")
                    .next_attempt_at(next),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, SaleStatus::Retrying);

        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.attempts, 1);
        assert_eq!(loaded.failure_kind, Some(FailureKind::Transient));
        assert_eq!(loaded.last_error.as_deref(), Some("connection reset"));
        assert!(loaded.next_attempt_at.is_some());
    }

    #[tokio::test]
    async fn test_update_rejects_invariant_violation() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();
        store.update("s1", &SalePatch::new().attempts(2)).await.unwrap();

        let err = store
            .update("s1", &SalePatch::new().attempts(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidUpdate(_)));
        assert_eq!(store.get("s1").await.unwrap().unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = store().await;
        let err = store
            .update("ghost", &SalePatch::new().attempts(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();

        assert!(store.remove("s1").await.unwrap());
        assert!(!store.remove("s1").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_moves_to_confirmed() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();
        store.append(&sale("s2")).await.unwrap();

        let done = store.complete("s1", &confirmation("S-2024-000123")).await.unwrap();
        assert_eq!(done.sale.status, SaleStatus::Submitted);

        let active: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(active, vec!["s2"]);

        let confirmed = store.confirmed(10).await.unwrap();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].confirmation.sale_number, "S-2024-000123");
        assert_eq!(confirmed[0].sale.payload, sale("x").payload);
    }

    #[tokio::test]
    async fn test_complete_failed_sale_rejected() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();
        store
            .update("s1", &SalePatch::new().status(SaleStatus::Failed))
            .await
            .unwrap();

        let err = store.complete("s1", &confirmation("S-1")).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidUpdate(_)));
        assert!(store.get("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_and_prune() {
        let store = store().await;
        store.append(&sale("s1")).await.unwrap();
        store.append(&sale("s2")).await.unwrap();
        store.append(&sale("s3")).await.unwrap();

        let old = Confirmation {
            sale_number: "S-OLD".to_string(),
            confirmed_at: Utc::now() - Duration::days(10),
        };
        store.complete("s3", &old).await.unwrap();
        store.complete("s2", &confirmation("S-NEW")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());

        let pruned = store
            .prune_confirmed(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(pruned, 1);

        let remaining = store.confirmed(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].confirmation.sale_number, "S-NEW");
    }

    #[tokio::test]
    async fn test_durable_across_reopen() {
        let path = std::env::temp_dir().join(format!("till-queue-{}.db", uuid::Uuid::new_v4()));

        {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            db.queue().append(&sale("s1")).await.unwrap();
            db.queue()
                .update("s1", &SalePatch::new().attempts(1))
                .await
                .unwrap();
            db.close().await;
        }

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let loaded = db.queue().get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.attempts, 1);
        db.close().await;

        let _ = std::fs::remove_file(&path);
    }
}
