//! # Sale Submitter
//!
//! The seam between the queue and the backend.
//!
//! ## Outcome Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  submit(sale)                                                           │
//! │       │                                                                 │
//! │       ├── Ok(Confirmation)        → SUBMITTED, moved to confirmed set   │
//! │       │                                                                 │
//! │       ├── Err(Transient)          → RETRYING (or FAILED when exhausted) │
//! │       │     network down, timeout, 5xx, 429                             │
//! │       │                                                                 │
//! │       └── Err(Permanent)          → FAILED, never retried automatically │
//! │             validation, conflict, duplicate sale number                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use thiserror::Error;
use till_core::{Confirmation, FailureKind, PendingSale};

/// Why a submission attempt did not produce a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// May succeed if retried unchanged.
    #[error("{0}")]
    Transient(String),

    /// The backend rejected the sale; retrying unchanged will not help.
    #[error("{0}")]
    Permanent(String),
}

impl SubmitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmitError::Transient(_) => FailureKind::Transient,
            SubmitError::Permanent(_) => FailureKind::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SubmitError::Transient(msg) | SubmitError::Permanent(msg) => msg,
        }
    }
}

/// Sends one sale to the backend.
///
/// Implementations must be safe to call again for the same sale: the
/// sale id is the idempotency key. The coordinator enforces its own
/// per-attempt timeout around every call.
#[async_trait]
pub trait SaleSubmitter: Send + Sync + 'static {
    async fn submit(&self, sale: &PendingSale) -> Result<Confirmation, SubmitError>;
}
