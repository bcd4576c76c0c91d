//! # Domain Types
//!
//! Types that flow through the offline sale queue.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Queue Types                                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  PendingSale    │   │  SalePayload    │   │  Confirmation   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (client)    │   │  customer       │   │  sale_number    │       │
//! │  │  payload ───────┼──►│  lines          │   │  confirmed_at   │       │
//! │  │  status         │   │  totals         │   └─────────────────┘       │
//! │  │  attempts       │   └─────────────────┘                              │
//! │  │  last_error     │                                                    │
//! │  │  next_attempt_at│   ┌─────────────────┐   ┌─────────────────┐       │
//! │  └─────────────────┘   │   SaleStatus    │   │   SalePatch     │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  Queued         │   │  metadata-only  │       │
//! │                        │  Retrying       │   │  partial update │       │
//! │                        │  Submitted      │   └─────────────────┘       │
//! │                        │  Failed         │                              │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Immutable Content, Mutable Metadata
//! A `PendingSale` carries the sale exactly as it was captured at checkout.
//! Only metadata (status, attempts, errors, timing) changes afterwards, and
//! only through [`PendingSale::apply`], which enforces the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Sale Status
// =============================================================================

/// Where a queued sale is in its reconciliation lifecycle.
///
/// ## State Machine
/// ```text
///              ┌──────────── attempt succeeds ────────────┐
///              │                                          ▼
///  enqueue ─► QUEUED ── transient, attempts < max ──► RETRYING
///              ▲  │                                       │
///              │  │                      timer fires ─────┘ (back to QUEUED)
///              │  │
///              │  └── permanent OR attempts >= max ──► FAILED
///              │                                          │
///              └────────────── manual retry ──────────────┘
///
///  SUBMITTED and FAILED are terminal: no automatic transition leaves them.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Waiting for (or undergoing) a submission attempt.
    Queued,
    /// Last attempt failed transiently; a retry timer is pending.
    Retrying,
    /// Backend confirmed the sale.
    Submitted,
    /// Permanently rejected or out of attempts; needs a person.
    Failed,
}

impl SaleStatus {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SaleStatus) -> bool {
        use SaleStatus::*;
        matches!(
            (self, next),
            (Queued, Submitted)
                | (Queued, Retrying)
                | (Queued, Failed)
                | (Retrying, Queued)
                | (Failed, Queued)
        )
    }

    /// Terminal states see no automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Submitted | SaleStatus::Failed)
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Queued => "queued",
            SaleStatus::Retrying => "retrying",
            SaleStatus::Submitted => "submitted",
            SaleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Failure Kind
// =============================================================================

/// Classification of the last submission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, timeout, server busy. Worth retrying unchanged.
    Transient,
    /// Validation or conflict. Retrying unchanged will not help.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

// =============================================================================
// Sale Payload
// =============================================================================

/// Customer reference attached to a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleCustomer {
    /// Backend customer id.
    pub id: String,

    /// Display name at the time of sale.
    #[serde(default)]
    pub name: Option<String>,
}

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    /// Stock keeping unit.
    pub sku: String,

    /// Product name as printed on the receipt.
    pub name: String,

    /// Units sold.
    pub quantity: i64,

    /// Unit price in cents.
    pub unit_price_cents: i64,

    /// Line-level discount in cents.
    #[serde(default)]
    pub discount_cents: i64,
}

impl SaleLine {
    /// Line total after its own discount; `None` on overflow.
    pub fn net(&self) -> Option<Money> {
        Money::from_cents(self.unit_price_cents)
            .checked_mul_quantity(self.quantity)?
            .checked_sub(Money::from_cents(self.discount_cents))
    }
}

/// Totals captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    /// Sum of line nets.
    pub subtotal_cents: i64,

    /// Order-level discount.
    #[serde(default)]
    pub discount_cents: i64,

    /// Tax as computed by the POS.
    #[serde(default)]
    pub tax_cents: i64,

    /// Amount due.
    pub total_cents: i64,
}

/// Sale content captured at checkout. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalePayload {
    /// Optional customer.
    #[serde(default)]
    pub customer: Option<SaleCustomer>,

    /// Lines in scan order.
    pub lines: Vec<SaleLine>,

    /// Totals as shown to the customer.
    pub totals: SaleTotals,

    /// Free-form cashier note.
    #[serde(default)]
    pub note: Option<String>,
}

// =============================================================================
// Pending Sale
// =============================================================================

/// A sale waiting to be reconciled with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingSale {
    /// Client-generated id, stable across retries, never reused.
    pub id: String,

    /// Sale content.
    pub payload: SalePayload,

    /// First enqueue.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Lifecycle state.
    pub status: SaleStatus,

    /// Submission attempts made so far.
    pub attempts: u32,

    /// Reason for the last failure, if any.
    pub last_error: Option<String>,

    /// Classification of `last_error`.
    pub failure_kind: Option<FailureKind>,

    /// Earliest time the scheduler may retry. Absent in terminal states.
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Start of the most recent attempt.
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Generates a client-side sale id.
///
/// UUID v4: unique without talking to the backend, so ids can be minted
/// while offline and double as the idempotency key.
pub fn new_sale_id() -> String {
    Uuid::new_v4().to_string()
}

impl PendingSale {
    /// Creates a freshly queued sale.
    pub fn new(id: impl Into<String>, payload: SalePayload, now: DateTime<Utc>) -> Self {
        PendingSale {
            id: id.into(),
            payload,
            created_at: now,
            status: SaleStatus::Queued,
            attempts: 0,
            last_error: None,
            failure_kind: None,
            next_attempt_at: None,
            last_attempt_at: None,
        }
    }

    /// Applies a metadata patch, enforcing the queue invariants.
    ///
    /// Every check runs before anything is written, so a rejected patch
    /// leaves the sale untouched.
    pub fn apply(&mut self, patch: &SalePatch) -> CoreResult<()> {
        if let Some(next) = patch.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(CoreError::InvalidTransition {
                    sale_id: self.id.clone(),
                    from: self.status,
                    to: next,
                });
            }
        }

        if let Some(attempts) = patch.attempts {
            if attempts < self.attempts {
                return Err(CoreError::AttemptsDecreased {
                    sale_id: self.id.clone(),
                    current: self.attempts,
                    requested: attempts,
                });
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(ref last_error) = patch.last_error {
            self.last_error = last_error.clone();
        }
        if let Some(failure_kind) = patch.failure_kind {
            self.failure_kind = failure_kind;
        }
        if let Some(next_attempt_at) = patch.next_attempt_at {
            self.next_attempt_at = next_attempt_at;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            self.last_attempt_at = Some(last_attempt_at);
        }

        if self.status.is_terminal() {
            self.next_attempt_at = None;
        }

        Ok(())
    }

    /// Returns true if a retry deadline exists and has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map(|at| at <= now).unwrap_or(false)
    }
}

// =============================================================================
// Sale Patch
// =============================================================================

/// Partial metadata update for a [`PendingSale`].
///
/// `None` leaves a field alone; `Some(None)` clears an optional field.
/// There is deliberately no way to express a payload change.
///
/// ## Example
/// ```rust
/// use till_core::{FailureKind, SalePatch, SaleStatus};
///
/// let patch = SalePatch::new()
///     .status(SaleStatus::Failed)
///     .error(FailureKind::Permanent, "duplicate sale number");
/// assert_eq!(patch.status, Some(SaleStatus::Failed));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SalePatch {
    pub status: Option<SaleStatus>,
    pub attempts: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub failure_kind: Option<Option<FailureKind>>,
    pub next_attempt_at: Option<Option<DateTime<Utc>>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl SalePatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: SaleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Records a failure and its classification.
    pub fn error(mut self, kind: FailureKind, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self.failure_kind = Some(Some(kind));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self.failure_kind = Some(None);
        self
    }

    pub fn next_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_attempt_at = Some(Some(at));
        self
    }

    pub fn clear_next_attempt(mut self) -> Self {
        self.next_attempt_at = Some(None);
        self
    }

    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }
}

// =============================================================================
// Confirmation
// =============================================================================

/// Backend acknowledgement of a submitted sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Confirmation {
    /// Server-assigned sale number (e.g., "S-2024-000123").
    pub sale_number: String,

    /// When the backend recorded the sale.
    #[ts(as = "String")]
    pub confirmed_at: DateTime<Utc>,
}

/// A sale moved out of the active queue after the backend confirmed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConfirmedSale {
    /// The sale, in `Submitted` state.
    pub sale: PendingSale,

    /// Backend acknowledgement.
    pub confirmation: Confirmation,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn payload() -> SalePayload {
        SalePayload {
            customer: None,
            lines: vec![SaleLine {
                sku: "CASE-IP15".to_string(),
                name: "Phone case".to_string(),
                quantity: 2,
                unit_price_cents: 1500,
                discount_cents: 0,
            }],
            totals: SaleTotals {
                subtotal_cents: 3000,
                discount_cents: 0,
                tax_cents: 240,
                total_cents: 3240,
            },
            note: None,
        }
    }

    #[test]
    fn test_transitions() {
        use SaleStatus::*;
        assert!(Queued.can_transition_to(Submitted));
        assert!(Queued.can_transition_to(Retrying));
        assert!(Queued.can_transition_to(Failed));
        assert!(Retrying.can_transition_to(Queued));
        assert!(Failed.can_transition_to(Queued));

        assert!(!Retrying.can_transition_to(Submitted));
        assert!(!Retrying.can_transition_to(Failed));
        assert!(!Submitted.can_transition_to(Queued));
        assert!(!Failed.can_transition_to(Retrying));
    }

    #[test]
    fn test_new_sale_is_queued() {
        let now = Utc::now();
        let sale = PendingSale::new("s1", payload(), now);
        assert_eq!(sale.status, SaleStatus::Queued);
        assert_eq!(sale.attempts, 0);
        assert_eq!(sale.created_at, now);
        assert!(sale.next_attempt_at.is_none());
    }

    #[test]
    fn test_apply_rejects_illegal_transition() {
        let mut sale = PendingSale::new("s1", payload(), Utc::now());
        sale.apply(&SalePatch::new().status(SaleStatus::Failed)).unwrap();

        let err = sale
            .apply(&SalePatch::new().status(SaleStatus::Submitted))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(sale.status, SaleStatus::Failed);
    }

    #[test]
    fn test_apply_rejects_decreasing_attempts() {
        let mut sale = PendingSale::new("s1", payload(), Utc::now());
        sale.apply(&SalePatch::new().attempts(3)).unwrap();

        let err = sale
            .apply(&SalePatch::new().attempts(2).status(SaleStatus::Retrying))
            .unwrap_err();
        assert!(matches!(err, CoreError::AttemptsDecreased { current: 3, requested: 2, .. }));
        // Nothing from the rejected patch leaked in
        assert_eq!(sale.status, SaleStatus::Queued);
        assert_eq!(sale.attempts, 3);
    }

    #[test]
    fn test_terminal_status_clears_deadline() {
        let now = Utc::now();
        let mut sale = PendingSale::new("s1", payload(), now);
        sale.apply(
            &SalePatch::new()
                .status(SaleStatus::Retrying)
                .next_attempt_at(now + Duration::seconds(2)),
        )
        .unwrap();
        assert!(sale.next_attempt_at.is_some());

        sale.apply(&SalePatch::new().status(SaleStatus::Queued)).unwrap();
        sale.apply(
            &SalePatch::new()
                .status(SaleStatus::Failed)
                .error(FailureKind::Permanent, "conflict"),
        )
        .unwrap();
        assert!(sale.next_attempt_at.is_none());
        assert_eq!(sale.failure_kind, Some(FailureKind::Permanent));
        assert_eq!(sale.last_error.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_new_sale_id_is_unique() {
        let a = new_sale_id();
        let b = new_sale_id();
        assert_ne!(a, b);
        assert!(crate::validation::validate_sale_id(&a).is_ok());
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut sale = PendingSale::new("s1", payload(), now);
        assert!(!sale.is_due(now));

        sale.next_attempt_at = Some(now - Duration::seconds(1));
        assert!(sale.is_due(now));

        sale.next_attempt_at = Some(now + Duration::seconds(1));
        assert!(!sale.is_due(now));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SaleStatus::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
    }

    #[test]
    fn test_line_net() {
        let line = SaleLine {
            sku: "SIM".to_string(),
            name: "SIM card".to_string(),
            quantity: 3,
            unit_price_cents: 500,
            discount_cents: 200,
        };
        assert_eq!(line.net(), Some(Money::from_cents(1300)));
    }
}
