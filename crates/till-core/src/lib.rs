//! # till-core: Pure Domain Logic for the Offline Sale Queue
//!
//! This crate holds the types and rules of the offline sale queue as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Offline Sale Queue                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    POS UI (renders snapshots)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ commands / snapshots                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                till-sync (QueueCoordinator)                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   retry   │  │   money   │  │ validation│  │   │
//! │  │   │PendingSale│  │RetryPolicy│  │   Money   │  │  payload  │  │   │
//! │  │   │SaleStatus │  │ decisions │  │           │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 till-db (LocalQueueStore)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `PendingSale`, `SaleStatus`, `SalePatch`, `Confirmation`
//! - [`retry`] - Backoff ceilings and give-up decisions
//! - [`money`] - Integer money used by payload totals
//! - [`error`] - Domain error types
//! - [`validation`] - Payload validation performed at enqueue time
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use till_core::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.ceiling(1), Duration::from_secs(2));
//! assert_eq!(policy.ceiling(3), Duration::from_secs(8));
//! assert_eq!(policy.ceiling(20), Duration::from_secs(60));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod retry;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use retry::{GiveUpReason, RetryPolicy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in a single queued sale.
pub const MAX_SALE_LINES: usize = 200;

/// Maximum quantity of a single line.
pub const MAX_LINE_QUANTITY: i64 = 9999;

/// Maximum length of a client-generated sale id.
pub const MAX_SALE_ID_LEN: usize = 64;
