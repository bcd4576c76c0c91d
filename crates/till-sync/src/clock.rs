//! Wall-clock source for persisted timestamps.
//!
//! Timers run on tokio time; the timestamps written to the store
//! (`created_at`, `next_attempt_at`, ...) come from a [`Clock`].

use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that follows tokio time, so it advances with a paused runtime.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        TokioClock {
            wall_origin: Utc::now(),
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let start = clock.now();

        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!((clock.now() - start).num_seconds(), 30);
    }
}
