//! # Retry Scheduler
//!
//! Cancellable, per-sale retry timers on a [`DelayQueue`].
//!
//! ## Timer Wheel
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  schedule("s1", 2s) ──► DelayQueue ──┐                                  │
//! │  schedule("s2", 8s) ──►              │   keys: { s1 → k1, s2 → k2 }     │
//! │  cancel("s2")       ──► remove(k2)   │                                  │
//! │                                      ▼                                  │
//! │  next_due().await  ──────────────► "s1"  (after 2s, no polling)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Jitter is drawn from `backoff::ExponentialBackoff`, pinned to the policy
//! ceiling for the attempt so it only contributes the randomization.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::debug;

use till_core::{FailureKind, GiveUpReason, RetryPolicy};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
    /// Try again after `delay`.
    Retry { delay: Duration },
    /// Stop and mark the sale failed.
    GiveUp(GiveUpReason),
}

/// Per-sale retry timers plus the policy that sizes them.
#[derive(Debug)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    queue: DelayQueue<String>,
    keys: HashMap<String, delay_queue::Key>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        RetryScheduler {
            policy,
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decides the next step for a sale whose `attempts`-th attempt failed.
    pub fn plan(&self, attempts: u32, kind: FailureKind) -> RetryPlan {
        match self.policy.should_retry(attempts, kind) {
            Ok(()) => RetryPlan::Retry {
                delay: self.jittered_delay(attempts),
            },
            Err(reason) => RetryPlan::GiveUp(reason),
        }
    }

    /// Ceiling for `attempts` with jitter applied.
    pub fn jittered_delay(&self, attempts: u32) -> Duration {
        let ceiling = self.policy.ceiling(attempts);
        if self.policy.jitter <= 0.0 {
            return ceiling;
        }

        let mut backoff = ExponentialBackoff {
            current_interval: ceiling,
            initial_interval: ceiling,
            randomization_factor: self.policy.jitter,
            multiplier: 1.0,
            max_interval: ceiling,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.next_backoff().unwrap_or(ceiling)
    }

    /// Arms (or re-arms) the timer for `id`.
    pub fn schedule(&mut self, id: &str, delay: Duration) {
        if let Some(key) = self.keys.remove(id) {
            self.queue.remove(&key);
        }
        let key = self.queue.insert(id.to_string(), delay);
        self.keys.insert(id.to_string(), key);
        debug!(sale_id = %id, ?delay, "Retry timer armed");
    }

    /// Disarms the timer for `id`. Returns whether one was armed.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.keys.remove(id) {
            Some(key) => {
                self.queue.remove(&key);
                debug!(sale_id = %id, "Retry timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Disarms every timer.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Waits for the next timer to fire and returns its sale id.
    ///
    /// Resolves to `None` immediately when nothing is armed, so callers in a
    /// `select!` loop must guard on [`RetryScheduler::is_empty`].
    pub async fn next_due(&mut self) -> Option<String> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let id = expired.into_inner();
        self.keys.remove(&id);
        Some(id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
