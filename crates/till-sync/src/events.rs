//! # Queue Events
//!
//! What the queue tells the outside world: a full [`QueueSnapshot`] after
//! every change, and a failure notice when a sale needs a person.
//!
//! ```text
//! QueueCoordinator ──► watch::Sender<QueueSnapshot> ──► UI subscribers
//!        │
//!        └──────────► QueueEventEmitter (host integration, logging, ...)
//! ```

use serde::Serialize;
use ts_rs::TS;

use till_core::{ConfirmedSale, PendingSale, SaleStatus};

/// Number of sales per state in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct QueueCounts {
    pub queued: u32,
    pub retrying: u32,
    pub failed: u32,
    /// Attempts currently waiting on the backend.
    pub in_flight: u32,
    /// Confirmed sales in the snapshot's recent view.
    pub recently_confirmed: u32,
}

/// Read-only view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct QueueSnapshot {
    /// Active sales in insertion order.
    pub pending: Vec<PendingSale>,

    /// Most recent confirmations, newest first.
    pub confirmed: Vec<ConfirmedSale>,

    /// Ids with an attempt in flight, sorted.
    pub in_flight: Vec<String>,

    pub counts: QueueCounts,

    /// Whether the coordinator is dispatching attempts.
    pub online: bool,
}

impl QueueSnapshot {
    pub fn new(
        pending: Vec<PendingSale>,
        confirmed: Vec<ConfirmedSale>,
        mut in_flight: Vec<String>,
        online: bool,
    ) -> Self {
        in_flight.sort();

        let mut counts = QueueCounts {
            in_flight: in_flight.len() as u32,
            recently_confirmed: confirmed.len() as u32,
            ..Default::default()
        };
        for sale in &pending {
            match sale.status {
                SaleStatus::Queued => counts.queued += 1,
                SaleStatus::Retrying => counts.retrying += 1,
                SaleStatus::Failed => counts.failed += 1,
                SaleStatus::Submitted => {}
            }
        }

        QueueSnapshot {
            pending,
            confirmed,
            in_flight,
            counts,
            online,
        }
    }

    /// Active sale by id.
    pub fn get(&self, id: &str) -> Option<&PendingSale> {
        self.pending.iter().find(|s| s.id == id)
    }

    /// Confirmed sale by id, if still in the recent view.
    pub fn confirmation(&self, id: &str) -> Option<&ConfirmedSale> {
        self.confirmed.iter().find(|c| c.sale.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.pending.iter().map(|s| s.id.as_str()).collect()
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Trait for emitting queue events (implemented by host integrations).
pub trait QueueEventEmitter: Send + Sync {
    /// Emits the queue view after a change.
    fn emit_snapshot(&self, snapshot: &QueueSnapshot);

    /// Emits a sale that just moved to FAILED.
    fn emit_failure(&self, sale: &PendingSale);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl QueueEventEmitter for NoOpEmitter {
    fn emit_snapshot(&self, _snapshot: &QueueSnapshot) {}
    fn emit_failure(&self, _sale: &PendingSale) {}
}
