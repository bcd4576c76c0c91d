//! # Queue Error Types
//!
//! Errors seen by callers of the queue coordinator and its configuration.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  User actions   │  │   Infrastructure        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Validation     │  │  Storage                │ │
//! │  │  MissingDeviceId│  │  SaleNotFound   │  │  HttpClient             │ │
//! │  │  InvalidUrl     │  │  NotRetryable   │  │  ShuttingDown           │ │
//! │  │  ConfigLoad/Save│  │  DuplicateId    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Submission failures are not here: they are recorded on the sale itself
//! (`last_error`, `failure_kind`) and never returned to a caller.

use thiserror::Error;
use till_core::{SaleStatus, ValidationError};
use till_db::DbError;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid queue configuration.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID.
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Invalid backend URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // User Action Errors
    // =========================================================================
    /// The sale payload failed validation; nothing was queued.
    #[error("Invalid sale: {0}")]
    Validation(#[from] ValidationError),

    /// No active sale with this id.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Manual retry is only allowed from FAILED.
    #[error("Sale {id} is {status}, only failed sales can be retried")]
    NotRetryable { id: String, status: SaleStatus },

    /// A sale with this id was already queued or confirmed.
    #[error("Sale {0} already exists")]
    DuplicateId(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// The queue store failed.
    #[error("Storage error: {0}")]
    Storage(DbError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// The coordinator task has stopped.
    #[error("Queue coordinator is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { id, .. } => QueueError::SaleNotFound(id),
            DbError::DuplicateId { id } => QueueError::DuplicateId(id),
            other => QueueError::Storage(other),
        }
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for QueueError {
    fn from(err: toml::de::Error) -> Self {
        QueueError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for QueueError {
    fn from(err: toml::ser::Error) -> Self {
        QueueError::ConfigSaveFailed(err.to_string())
    }
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        QueueError::HttpClient(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl QueueError {
    /// Returns true if the caller can fix this by changing what it asked for.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            QueueError::Validation(_)
                | QueueError::SaleNotFound(_)
                | QueueError::NotRetryable { .. }
                | QueueError::DuplicateId(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            QueueError::InvalidConfig(_)
                | QueueError::MissingDeviceId
                | QueueError::InvalidUrl(_)
                | QueueError::ConfigLoadFailed(_)
                | QueueError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_queue_errors() {
        let err: QueueError = DbError::not_found("PendingSale", "s1").into();
        assert!(matches!(err, QueueError::SaleNotFound(ref id) if id == "s1"));

        let err: QueueError = DbError::duplicate("s1").into();
        assert!(matches!(err, QueueError::DuplicateId(_)));

        let err: QueueError = DbError::PoolExhausted.into();
        assert!(matches!(err, QueueError::Storage(_)));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_categories() {
        assert!(QueueError::MissingDeviceId.is_config_error());
        assert!(QueueError::NotRetryable {
            id: "s1".into(),
            status: SaleStatus::Queued,
        }
        .is_user_error());
        assert!(!QueueError::ShuttingDown.is_user_error());
    }

    #[test]
    fn test_not_retryable_message() {
        let err = QueueError::NotRetryable {
            id: "s1".into(),
            status: SaleStatus::Retrying,
        };
        assert_eq!(
            err.to_string(),
            "Sale s1 is retrying, only failed sales can be retried"
        );
    }
}
