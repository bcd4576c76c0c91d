//! # till-db: Durable Queue Store
//!
//! Storage for the offline sale queue. SQLite via sqlx for real registers,
//! an in-memory twin for tests and ephemeral sessions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueCoordinator (till-sync, the only writer)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │   │ LocalQueueStore  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄──│ SqliteQueueStore │   │  (embedded)  │  │   │
//! │  │   │               │   │ MemoryQueueStore │   │              │  │   │
//! │  │   └───────────────┘   └──────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL, synchronous=FULL)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_db::{Database, DbConfig, LocalQueueStore};
//!
//! let db = Database::new(DbConfig::new("path/to/queue.db")).await?;
//! let store = db.queue();
//! for sale in store.list().await? {
//!     println!("{} {}", sale.id, sale.status);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryQueueStore;
pub use pool::{Database, DbConfig};
pub use repository::pending_sale::SqliteQueueStore;
pub use store::LocalQueueStore;
