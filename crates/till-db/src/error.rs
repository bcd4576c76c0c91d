//! # Store Error Types
//!
//! Error types for queue store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)      Invariant violation (CoreError)       │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  QueueError (till-sync) ← What coordinator callers see                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use till_core::CoreError;

/// Queue store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// No active record with this id.
    ///
    /// ## When This Occurs
    /// - Updating a sale that was purged
    /// - Completing a sale twice
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A record with this id already exists, active or confirmed.
    ///
    /// Ids are never reused, so this always points at a caller bug.
    #[error("Duplicate sale id: '{id}' already exists")]
    DuplicateId { id: String },

    /// A patch that would break a queue invariant. Nothing was written.
    #[error("Rejected update: {0}")]
    InvalidUpdate(#[from] CoreError),

    /// A stored column could not be decoded.
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// JSON encoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a DuplicateId error.
    pub fn duplicate(id: impl Into<String>) -> Self {
        DbError::DuplicateId { id: id.into() }
    }

    /// Creates a Corrupt error.
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller rather than the storage medium.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            DbError::NotFound { .. } | DbError::DuplicateId { .. } | DbError::InvalidUpdate(_)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → UNIQUE violation → DbError::DuplicateId
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: pending_sales.id"
                if msg.contains("UNIQUE constraint failed") {
                    DbError::DuplicateId {
                        id: msg
                            .split("UNIQUE constraint failed: ")
                            .nth(1)
                            .unwrap_or("unknown")
                            .to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
