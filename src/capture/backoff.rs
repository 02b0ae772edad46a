//! Additive poll backoff bounded by an operation deadline.
//!
//! Every wait loop in the orchestrator shares this shape: start small,
//! grow by a fixed step, cap each sleep, and never sleep past the
//! deadline. The delay schedule is a pure function of the iteration
//! count and the remaining budget; only [`wait`](Backoff::wait) touches
//! the clock, so tests run the whole schedule on a paused runtime.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::PtpConfig;

/// One backoff schedule, consumed across the polls of one operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    step: Duration,
    cap: Duration,
    deadline: Instant,
    started: Instant,
}

impl Backoff {
    /// A schedule running from now until `deadline`.
    #[must_use]
    pub fn new(initial: Duration, step: Duration, cap: Duration, deadline: Instant) -> Self {
        Self {
            current: initial,
            step,
            cap,
            deadline,
            started: Instant::now(),
        }
    }

    /// A schedule shaped by `config` with `budget` left to spend.
    #[must_use]
    pub fn for_budget(config: &PtpConfig, budget: Duration) -> Self {
        Self::new(
            config.backoff_initial,
            config.backoff_step,
            config.backoff_cap,
            Instant::now() + budget,
        )
    }

    /// The absolute deadline this schedule honors.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// How long this schedule has been running.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// The next sleep given `remaining` budget, or `None` when the
    /// budget is spent. Grows the schedule as a side effect.
    pub(crate) fn next_delay(&mut self, remaining: Duration) -> Option<Duration> {
        if remaining.is_zero() {
            return None;
        }
        let delay = self.current.min(self.cap).min(remaining);
        self.current = (self.current + self.step).min(self.cap);
        Some(delay)
    }

    /// Sleeps for the next scheduled delay. Returns `false` without
    /// sleeping once the deadline has passed.
    pub async fn wait(&mut self) -> bool {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match self.next_delay(remaining) {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }
}
