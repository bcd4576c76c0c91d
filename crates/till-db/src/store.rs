//! # LocalQueueStore
//!
//! The durable home of every sale that has not yet been confirmed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   LocalQueueStore                                       │
//! │                                                                         │
//! │  active queue (insertion order)          confirmed set                  │
//! │  ┌──────────────────────────────┐        ┌──────────────────────┐      │
//! │  │ s1 QUEUED                    │ complete│ s0 SUBMITTED S-0042 │      │
//! │  │ s2 RETRYING  next=12:00:04   │───────►│ ...                  │      │
//! │  │ s3 FAILED    "409 conflict"  │        └──────────────────────┘      │
//! │  └──────────────────────────────┘                                       │
//! │                                                                         │
//! │  • one record per id across both halves; ids never reused              │
//! │  • update() applies a SalePatch via PendingSale::apply                 │
//! │  • every mutating call is durable before it returns                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use till_core::{Confirmation, ConfirmedSale, PendingSale, SalePatch};

use crate::error::DbResult;

/// Persistent storage for queued sales.
///
/// The coordinator is the only writer; implementations must still reject
/// patches that break a queue invariant rather than persist them.
#[async_trait]
pub trait LocalQueueStore: Send + Sync {
    /// Inserts a new sale. `DuplicateId` if the id is already known.
    async fn append(&self, sale: &PendingSale) -> DbResult<()>;

    /// Applies a metadata patch and returns the updated record.
    /// `NotFound` if the id is not in the active queue.
    async fn update(&self, id: &str, patch: &SalePatch) -> DbResult<PendingSale>;

    /// Removes an active record. Returns whether anything was removed.
    async fn remove(&self, id: &str) -> DbResult<bool>;

    /// Removes every active record. Returns how many were removed.
    async fn clear(&self) -> DbResult<u64>;

    /// Looks up one active record.
    async fn get(&self, id: &str) -> DbResult<Option<PendingSale>>;

    /// All active records in insertion order.
    async fn list(&self) -> DbResult<Vec<PendingSale>>;

    /// Moves an active record to the confirmed set in one step.
    async fn complete(&self, id: &str, confirmation: &Confirmation) -> DbResult<ConfirmedSale>;

    /// Most recent confirmed sales, newest first.
    async fn confirmed(&self, limit: u32) -> DbResult<Vec<ConfirmedSale>>;

    /// Deletes confirmed sales confirmed before `cutoff`. Returns the count.
    async fn prune_confirmed(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;
}
