//! The two fixed delays used by seed creation, and the short not-ready poll.
//!
//! The base behavior calls for exactly two backoff delays between three
//! attempts (not exponential), so this is a closed two-element sequence
//! rather than a general `IntervalFunction` abstraction.

use std::time::Duration;

pub(crate) const SEED_CREATION_ATTEMPTS: usize = 3;
pub(crate) const SEED_CREATION_DELAYS: [Duration; 2] =
    [Duration::from_secs(1), Duration::from_secs(2)];

pub(crate) const NOT_READY_BUDGET: Duration = Duration::from_millis(500);
pub(crate) const NOT_READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Delay to wait after attempt index `attempt` (0-based) fails, before the
/// next attempt. Returns `None` once attempts are exhausted.
pub(crate) fn delay_after_attempt(attempt: usize) -> Option<Duration> {
    SEED_CREATION_DELAYS.get(attempt).copied()
}
