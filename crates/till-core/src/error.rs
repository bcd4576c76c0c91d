//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - State machine / invariant violations           │
//! │  └── ValidationError  - Payload validation failures                    │
//! │                                                                         │
//! │  till-db errors (separate crate)                                       │
//! │  └── DbError          - Store failures (DuplicateId, NotFound, ...)    │
//! │                                                                         │
//! │  till-sync errors (separate crate)                                     │
//! │  ├── SubmitError      - Transient / Permanent submission outcomes      │
//! │  └── QueueError       - What callers of the coordinator see            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → QueueError → UI         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::SaleStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Invariant violations on queued sales.
///
/// These should never reach an end user in correct usage: the coordinator only
/// builds patches that follow the state machine. They exist so the store can
/// refuse a bad write instead of persisting it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status change that the queue state machine does not allow.
    ///
    /// ## Allowed Transitions
    /// ```text
    /// QUEUED ──► SUBMITTED
    /// QUEUED ──► RETRYING ──► QUEUED
    /// QUEUED ──► FAILED ──(manual retry)──► QUEUED
    /// ```
    #[error("Sale {sale_id} cannot move from {from} to {to}")]
    InvalidTransition {
        sale_id: String,
        from: SaleStatus,
        to: SaleStatus,
    },

    /// The attempt counter only grows.
    #[error("Sale {sale_id} attempts cannot decrease from {current} to {requested}")]
    AttemptsDecreased {
        sale_id: String,
        current: u32,
        requested: u32,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Payload validation errors.
///
/// Raised once, when a sale is enqueued. A payload that passes is never
/// re-validated by the submitter.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid characters in an id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A derived amount does not match the one captured at checkout.
    #[error("{field} is {actual} but lines add up to {expected}")]
    Mismatch {
        field: String,
        expected: i64,
        actual: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = CoreError::InvalidTransition {
            sale_id: "sale-1".to_string(),
            from: SaleStatus::Failed,
            to: SaleStatus::Submitted,
        };
        assert_eq!(
            err.to_string(),
            "Sale sale-1 cannot move from failed to submitted"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "lines".to_string(),
        };
        assert_eq!(err.to_string(), "lines is required");

        let err = ValidationError::Mismatch {
            field: "subtotal".to_string(),
            expected: 1000,
            actual: 999,
        };
        assert_eq!(err.to_string(), "subtotal is 999 but lines add up to 1000");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
