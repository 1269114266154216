use std::time::Duration;

/// A point-in-time snapshot of the rate controller's state, safe to hand to a
/// caller without holding any lock.
#[derive(Debug, Clone)]
pub struct RateStatistics {
    pub current: usize,
    pub floor: usize,
    pub ceiling: usize,
    pub connection_count: usize,
    pub last_known_good: usize,
    pub batches_since_throttle: u64,
    pub total_throttle_events: u64,
    pub total_successful_batches: u64,
    pub batch_samples: u64,
    pub has_had_first_throttle: bool,
    pub throttle_ceiling: Option<usize>,
    pub throttle_ceiling_active: bool,
    pub batch_duration_ema: Option<Duration>,
    pub min_observed_batch_duration: Option<Duration>,
    pub batch_rate_ema_per_sec: Option<f64>,
}
