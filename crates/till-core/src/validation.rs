//! # Validation Module
//!
//! Payload validation performed once, when a sale enters the queue.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Checkout completes                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  QueueHandle::enqueue(payload)                                          │
//! │       │                                                                 │
//! │       ├── validate_sale_id(id)        ← THIS MODULE                     │
//! │       ├── validate_sale_payload(&p)   ← THIS MODULE                     │
//! │       │       │                                                         │
//! │       │       └── Err → rejected, nothing is stored                     │
//! │       ▼                                                                 │
//! │  LocalQueueStore::append                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SaleSubmitter::submit  (never re-validates)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("CASE-IP15").unwrap();
//! validate_quantity(5).unwrap();
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{SaleLine, SalePayload};
use crate::{MAX_LINE_QUANTITY, MAX_SALE_ID_LEN, MAX_SALE_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a client-generated sale id.
///
/// ## Rules
/// - Must not be empty
/// - At most `MAX_SALE_ID_LEN` characters
/// - Letters, digits, hyphens, underscores only (UUIDs pass)
pub fn validate_sale_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    if id.len() > MAX_SALE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "id".to_string(),
            max: MAX_SALE_ID_LEN,
        });
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a SKU.
///
/// ## Example
/// ```rust
/// use till_core::validation::validate_sku;
///
/// assert!(validate_sku("SIM-PREPAID").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    Ok(())
}

/// Validates a product name as printed on the receipt.
pub fn validate_line_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: `1..=MAX_LINE_QUANTITY`.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a non-negative amount in cents. Zero is allowed (free items).
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Payload Validation
// =============================================================================

fn overflow(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
}

/// Validates one line and returns its net amount.
fn validate_line(index: usize, line: &SaleLine) -> ValidationResult<Money> {
    validate_sku(&line.sku)?;
    validate_line_name(&line.name)?;
    validate_quantity(line.quantity)?;
    validate_amount("unit_price_cents", line.unit_price_cents)?;
    validate_amount("discount_cents", line.discount_cents)?;

    let gross = Money::from_cents(line.unit_price_cents)
        .checked_mul_quantity(line.quantity)
        .ok_or_else(|| overflow("line total"))?;

    if line.discount_cents > gross.cents() {
        return Err(ValidationError::OutOfRange {
            field: format!("lines[{}].discount_cents", index),
            min: 0,
            max: gross.cents(),
        });
    }

    Ok(gross - Money::from_cents(line.discount_cents))
}

/// Validates a sale payload before it is queued.
///
/// ## Rules
/// - Between 1 and `MAX_SALE_LINES` lines
/// - Every line has a sku, a name and a quantity in range
/// - Amounts are non-negative and a line discount never exceeds the line
/// - `subtotal` equals the sum of line nets
/// - `total = subtotal - discount + tax`, and is not negative
pub fn validate_sale_payload(payload: &SalePayload) -> ValidationResult<()> {
    if payload.lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if payload.lines.len() > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    if let Some(customer) = &payload.customer {
        if customer.id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "customer.id".to_string(),
            });
        }
    }

    let mut subtotal = Money::zero();
    for (index, line) in payload.lines.iter().enumerate() {
        let net = validate_line(index, line)?;
        subtotal = subtotal
            .checked_add(net)
            .ok_or_else(|| overflow("subtotal_cents"))?;
    }

    let totals = &payload.totals;
    validate_amount("totals.discount_cents", totals.discount_cents)?;
    validate_amount("totals.tax_cents", totals.tax_cents)?;
    validate_amount("totals.total_cents", totals.total_cents)?;

    if totals.subtotal_cents != subtotal.cents() {
        return Err(ValidationError::Mismatch {
            field: "subtotal_cents".to_string(),
            expected: subtotal.cents(),
            actual: totals.subtotal_cents,
        });
    }

    let expected_total = subtotal
        .checked_sub(Money::from_cents(totals.discount_cents))
        .and_then(|m| m.checked_add(Money::from_cents(totals.tax_cents)))
        .ok_or_else(|| overflow("total_cents"))?;

    if expected_total.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "totals.discount_cents".to_string(),
            min: 0,
            max: subtotal.cents() + totals.tax_cents,
        });
    }

    if totals.total_cents != expected_total.cents() {
        return Err(ValidationError::Mismatch {
            field: "total_cents".to_string(),
            expected: expected_total.cents(),
            actual: totals.total_cents,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
