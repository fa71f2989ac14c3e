//! Wall-clock budget accounting and the continue/stop decision.

use std::time::{Duration, Instant};

/// The wall-clock allowance fixed at worker startup: the moment the clock
/// started and the total seconds the external scheduler will allow before
/// force-killing the process. Read-only after construction.
#[derive(Debug, Clone, Copy)]
pub struct WallBudget {
    pub start: Instant,
    pub total: Duration,
}

impl WallBudget {
    pub fn new(start: Instant, total: Duration) -> Self {
        Self { start, total }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.start)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.total.saturating_sub(self.elapsed(now))
    }
}

/// Whether another trial may be safely attempted: continue iff
/// `total_budget - (now - start) >= estimate`. Exactly enough time left
/// counts as enough.
pub fn should_continue(
    now: Instant,
    start: Instant,
    total_budget: Duration,
    estimate: Duration,
) -> bool {
    let elapsed = now.duration_since(start);
    match total_budget.checked_sub(elapsed) {
        Some(time_left) => time_left >= estimate,
        None => false,
    }
}
