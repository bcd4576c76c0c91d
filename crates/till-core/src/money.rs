//! # Money Module
//!
//! Integer money used when checking the totals captured in a sale payload.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Payload totals are captured by the POS in cents and re-checked here   │
//! │  before the sale is queued. Floating point would make the equality     │
//! │  check `subtotal == Σ lines` meaningless:                              │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │    10 + 20   = 30 (cents)            ✅                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payload values come from outside the process, so every arithmetic helper
//! here is checked: an overflowing sale is a validation failure, not a panic.
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let unit = Money::from_cents(299);
//! let line = unit.checked_mul_quantity(3).unwrap();
//! assert_eq!(line.cents(), 897);
//! assert_eq!(line.to_string(), "$8.97");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    #[inline]
    pub fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Adds two values, returning `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts two values, returning `None` on overflow.
    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Self> {
        self.0.checked_sub(other.0).map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly rendering; the UI does its own localized formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
