//! In-memory [`LocalQueueStore`].
//!
//! Same invariants as the SQLite store, nothing survives the process. Used by
//! coordinator tests and by sessions that opt out of persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use till_core::{Confirmation, ConfirmedSale, PendingSale, SalePatch, SaleStatus};

use crate::error::{DbError, DbResult};
use crate::store::LocalQueueStore;

#[derive(Debug, Default)]
struct Inner {
    /// Insertion order.
    pending: Vec<PendingSale>,
    /// Completion order (oldest first).
    confirmed: Vec<ConfirmedSale>,
}

impl Inner {
    fn position(&self, id: &str) -> Option<usize> {
        self.pending.iter().position(|s| s.id == id)
    }
}

/// Non-durable queue store.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    inner: RwLock<Inner>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalQueueStore for MemoryQueueStore {
    async fn append(&self, sale: &PendingSale) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let known = inner.position(&sale.id).is_some()
            || inner.confirmed.iter().any(|c| c.sale.id == sale.id);
        if known {
            return Err(DbError::duplicate(&sale.id));
        }
        inner.pending.push(sale.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: &SalePatch) -> DbResult<PendingSale> {
        let mut inner = self.inner.write().await;
        let index = inner
            .position(id)
            .ok_or_else(|| DbError::not_found("PendingSale", id))?;

        // Apply to a copy so a rejected patch leaves the stored record alone
        let mut sale = inner.pending[index].clone();
        sale.apply(patch)?;
        inner.pending[index] = sale.clone();
        Ok(sale)
    }

    async fn remove(&self, id: &str) -> DbResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.position(id) {
            Some(index) => {
                inner.pending.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> DbResult<u64> {
        let mut inner = self.inner.write().await;
        let count = inner.pending.len() as u64;
        inner.pending.clear();
        Ok(count)
    }

    async fn get(&self, id: &str) -> DbResult<Option<PendingSale>> {
        let inner = self.inner.read().await;
        Ok(inner.pending.iter().find(|s| s.id == id).cloned())
    }

    async fn list(&self) -> DbResult<Vec<PendingSale>> {
        Ok(self.inner.read().await.pending.clone())
    }

    async fn complete(&self, id: &str, confirmation: &Confirmation) -> DbResult<ConfirmedSale> {
        let mut inner = self.inner.write().await;
        let index = inner
            .position(id)
            .ok_or_else(|| DbError::not_found("PendingSale", id))?;

        let mut sale = inner.pending[index].clone();
        sale.apply(&SalePatch::new().status(SaleStatus::Submitted))?;

        inner.pending.remove(index);
        let done = ConfirmedSale {
            sale,
            confirmation: confirmation.clone(),
        };
        inner.confirmed.push(done.clone());
        Ok(done)
    }

    async fn confirmed(&self, limit: u32) -> DbResult<Vec<ConfirmedSale>> {
        let inner = self.inner.read().await;
        let mut all = inner.confirmed.clone();
        // Stable sort keeps completion order for equal timestamps
        all.sort_by(|a, b| a.confirmation.confirmed_at.cmp(&b.confirmation.confirmed_at));
        Ok(all.into_iter().rev().take(limit as usize).collect())
    }

    async fn prune_confirmed(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.confirmed.len();
        inner
            .confirmed
            .retain(|c| c.confirmation.confirmed_at >= cutoff);
        Ok((before - inner.confirmed.len()) as u64)
    }
}
