//! Per-folder retry bookkeeping.
//!
//! Wait after `k` consecutive failures is `min(W0 * 1.5^(k-1), cap)`. The
//! first failure after a clean run retries immediately; later ones wait the
//! current value.

use std::time::Duration;

use meshsync_sync::ExitCategory;

pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(5000);
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(5 * 60);
const BACKOFF_FACTOR: f64 = 1.5;

/// What to do after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Immediate,
    After(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    pub resync_required: bool,
    pub consecutive_failures: u32,
    pub current_wait: Duration,
    default_wait: Duration,
    max_wait: Duration,
}

impl RetryState {
    pub fn new(resync_required: bool) -> Self {
        Self::with_waits(resync_required, DEFAULT_RETRY_WAIT, MAX_RETRY_WAIT)
    }

    pub fn with_waits(resync_required: bool, default_wait: Duration, max_wait: Duration) -> Self {
        Self {
            resync_required,
            consecutive_failures: 0,
            current_wait: default_wait,
            default_wait,
            max_wait,
        }
    }

    /// A clean run establishes a baseline and clears all failure state.
    pub fn record_success(&mut self) {
        self.resync_required = false;
        self.consecutive_failures = 0;
        self.current_wait = self.default_wait;
    }

    /// Fatal failures force a resync; minor ones leave the flag alone.
    pub fn record_failure(&mut self, category: ExitCategory) -> RetryDecision {
        if category == ExitCategory::FatalError {
            self.resync_required = true;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures == 1 {
            return RetryDecision::Immediate;
        }

        self.current_wait = self
            .current_wait
            .mul_f64(BACKOFF_FACTOR)
            .min(self.max_wait);
        RetryDecision::After(self.current_wait)
    }
}
