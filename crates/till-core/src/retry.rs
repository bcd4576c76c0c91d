//! # Retry Policy
//!
//! Pure retry decisions: how long to wait after a transient failure and when
//! to stop trying. Randomness lives in till-sync; this module only computes
//! the deterministic ceiling and the jitter window around it.
//!
//! ## Backoff Curve (defaults)
//! ```text
//! attempts │ ceiling │ window (±20%)
//! ─────────┼─────────┼──────────────
//!     1    │   2s    │  1.6s – 2.4s
//!     2    │   4s    │  3.2s – 4.8s
//!     3    │   8s    │  6.4s – 9.6s
//!     4    │  16s    │ 12.8s – 19.2s
//!     5    │  32s    │ 25.6s – 38.4s
//!    6+    │  60s    │ 48.0s – 72.0s   (capped)
//!     8    │   --    │ FAILED: attempts exhausted
//! ```

use std::time::Duration;

use crate::error::ValidationError;
use crate::types::FailureKind;

/// Default first retry delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default cap on the retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default jitter fraction.
pub const DEFAULT_JITTER: f64 = 0.2;

/// Default number of attempts before a sale is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Why the queue stopped retrying a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The backend rejected the sale; retrying unchanged will not help.
    Permanent,
    /// Transient failures used up every attempt.
    AttemptsExhausted { max: u32 },
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction in `[0, 1)` applied symmetrically around the ceiling.
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the `attempts`-th failure:
    /// `min(max_delay, base_delay * 2^(attempts-1))`.
    pub fn ceiling(&self, attempts: u32) -> Duration {
        let exponent = attempts.max(1) - 1;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Inclusive window a jittered delay falls into.
    pub fn jitter_window(&self, attempts: u32) -> (Duration, Duration) {
        let ceiling = self.ceiling(attempts);
        (
            ceiling.mul_f64(1.0 - self.jitter),
            ceiling.mul_f64(1.0 + self.jitter),
        )
    }

    /// Decides whether a failed sale gets another automatic attempt.
    ///
    /// `attempts` is the count including the attempt that just failed.
    pub fn should_retry(&self, attempts: u32, kind: FailureKind) -> Result<(), GiveUpReason> {
        match kind {
            FailureKind::Permanent => Err(GiveUpReason::Permanent),
            FailureKind::Transient if attempts >= self.max_attempts => {
                Err(GiveUpReason::AttemptsExhausted {
                    max: self.max_attempts,
                })
            }
            FailureKind::Transient => Ok(()),
        }
    }

    /// Rejects policies that would never retry sensibly.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_delay.is_zero() {
            return Err(ValidationError::MustBePositive {
                field: "retry.base_delay_ms".to_string(),
            });
        }
        if self.max_delay < self.base_delay {
            return Err(ValidationError::InvalidFormat {
                field: "retry.max_delay_secs".to_string(),
                reason: "must not be shorter than the base delay".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ValidationError::InvalidFormat {
                field: "retry.jitter".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ValidationError::MustBePositive {
                field: "retry.max_attempts".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_then_caps() {
        let policy = RetryPolicy::default();
        let ceilings: Vec<u64> = (1..=7).map(|n| policy.ceiling(n).as_secs()).collect();
        assert_eq!(ceilings, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_ceiling_huge_attempt_count() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(u32::MAX), DEFAULT_MAX_DELAY);
        assert_eq!(policy.ceiling(0), DEFAULT_BASE_DELAY);
    }

    #[test]
    fn test_jitter_window() {
        let policy = RetryPolicy::default();
        let (low, high) = policy.jitter_window(1);
        assert_eq!(low, Duration::from_millis(1600));
        assert_eq!(high, Duration::from_millis(2400));
    }

    #[test]
    fn test_windows_do_not_overlap_before_cap() {
        let policy = RetryPolicy::default();
        for n in 1..5 {
            let (_, high) = policy.jitter_window(n);
            let (next_low, _) = policy.jitter_window(n + 1);
            assert!(high < next_low, "attempt {} window overlaps the next", n);
        }
    }

    #[test]
    fn test_permanent_never_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(1, FailureKind::Permanent),
            Err(GiveUpReason::Permanent)
        );
    }

    #[test]
    fn test_transient_until_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_retry(1, FailureKind::Transient).is_ok());
        assert!(policy.should_retry(2, FailureKind::Transient).is_ok());
        assert_eq!(
            policy.should_retry(3, FailureKind::Transient),
            Err(GiveUpReason::AttemptsExhausted { max: 3 })
        );
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());

        let bad = RetryPolicy {
            jitter: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = RetryPolicy {
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
