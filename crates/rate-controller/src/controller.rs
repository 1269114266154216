use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{constants, RateControllerConfig};
use crate::statistics::RateStatistics;

#[cfg(feature = "tracing")]
use tracing::debug;

/// All mutable rate-controller state, transitioned under a single mutex per
/// the concurrency contract: writes are short bounded arithmetic, no I/O.
struct RateState {
    current: usize,
    floor: usize,
    ceiling: usize,
    connection_count: usize,

    last_known_good: usize,
    last_known_good_time: Instant,

    batches_since_throttle: u64,
    total_throttle_events: u64,
    total_successful_batches: u64,
    batch_samples: u64,

    last_throttle_time: Option<Instant>,
    last_increase_time: Option<Instant>,
    last_activity_time: Instant,
    last_throttle_processed: Option<Instant>,
    has_had_first_throttle: bool,

    throttle_ceiling: Option<f64>,
    throttle_ceiling_expiry: Option<Instant>,

    exec_time_ceiling: Option<f64>,
    request_rate_ceiling: Option<f64>,
    batch_duration_ema_ms: Option<f64>,
    min_batch_duration_ms: Option<f64>,
    batch_rate_ema: Option<f64>,
}

impl RateState {
    fn uninitialized(now: Instant) -> Self {
        Self {
            current: 0,
            floor: 0,
            ceiling: 0,
            connection_count: 0,
            last_known_good: 0,
            last_known_good_time: now,
            batches_since_throttle: 0,
            total_throttle_events: 0,
            total_successful_batches: 0,
            batch_samples: 0,
            last_throttle_time: None,
            last_increase_time: None,
            last_activity_time: now,
            last_throttle_processed: None,
            has_had_first_throttle: false,
            throttle_ceiling: None,
            throttle_ceiling_expiry: None,
            exec_time_ceiling: None,
            request_rate_ceiling: None,
            batch_duration_ema_ms: None,
            min_batch_duration_ms: None,
            batch_rate_ema: None,
        }
    }

    fn reinitialize_bounds(&mut self, server_hint_per_source: usize, connection_count: usize, min_parallelism: usize, now: Instant) {
        let floor = (server_hint_per_source * connection_count).max(min_parallelism);
        let ceiling = constants::HARD_CAP_PER_CONNECTION * connection_count;
        self.floor = floor;
        self.ceiling = ceiling;
        self.current = floor;
        self.connection_count = connection_count;
        self.last_known_good = floor;
        self.last_known_good_time = now;
        self.last_activity_time = now;
    }

    fn initial_ceiling(&self) -> usize {
        constants::INITIAL_CEILING_FACTOR * self.connection_count
    }

    fn effective_ceiling(&self, now: Instant) -> usize {
        let mut ceiling = self.ceiling;

        if self.batch_samples < constants::INITIAL_CEILING_SAMPLE_THRESHOLD {
            ceiling = ceiling.min(self.initial_ceiling());
        }

        if let Some(expiry) = self.throttle_ceiling_expiry {
            if now < expiry {
                if let Some(throttle_ceiling) = self.throttle_ceiling {
                    ceiling = ceiling.min(throttle_ceiling.floor() as usize);
                }
            }
        }

        if let Some(request_rate_ceiling) = self.request_rate_ceiling {
            ceiling = ceiling.min(request_rate_ceiling.floor().max(0.0) as usize);
        }

        if let Some(exec_time_ceiling) = self.exec_time_ceiling {
            ceiling = ceiling.min(exec_time_ceiling.floor().max(0.0) as usize);
        }

        ceiling.max(self.floor)
    }

    fn recompute_derived_ceilings(&mut self, config: &RateControllerConfig) {
        if let Some(min_batch_ms) = self.min_batch_duration_ms {
            let min_batch_secs = (min_batch_ms / 1000.0).max(f64::EPSILON);
            self.request_rate_ceiling = Some(config.request_rate_factor * min_batch_secs);
        }
        if let Some(ema_ms) = self.batch_duration_ema_ms {
            let ema_secs = (ema_ms / 1000.0).max(f64::EPSILON);
            self.exec_time_ceiling =
                Some(config.exec_time_factor * self.connection_count as f64 / ema_secs);
        }
    }

    fn maybe_idle_reset(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_activity_time) > constants::IDLE_RESET {
            let preserved_total_throttle_events = self.total_throttle_events;
            let floor = self.floor;
            let connection_count = self.connection_count;
            *self = RateState::uninitialized(now);
            self.total_throttle_events = preserved_total_throttle_events;
            self.floor = floor;
            self.ceiling = constants::HARD_CAP_PER_CONNECTION * connection_count;
            self.connection_count = connection_count;
            self.current = floor;
            self.last_known_good = floor;
            self.last_known_good_time = now;
            self.last_activity_time = now;
        }
    }

    fn maybe_promote_stale_last_known_good(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_known_good_time) > constants::LAST_KNOWN_GOOD_TTL {
            self.last_known_good = self.current;
            self.last_known_good_time = now;
        }
    }
}

/// Pool-wide AIMD parallelism controller.
///
/// Thread-safe; a single mutex serializes all state transitions, matching the
/// resource model's instruction that rate-state writes are short bounded
/// arithmetic with no I/O so a single lock never becomes a bottleneck.
pub struct RateController {
    config: RateControllerConfig,
    state: Mutex<RateState>,
}

impl RateController {
    pub fn new(config: RateControllerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateState::uninitialized(Instant::now())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        true
    }

    /// Computes (and returns) `current_parallelism`. Reinitializes bounds on
    /// first use and whenever `connection_count` changes.
    pub fn get_parallelism(&self, server_hint_per_source: usize, connection_count: usize) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate controller mutex poisoned");

        if state.connection_count != connection_count {
            state.reinitialize_bounds(server_hint_per_source, connection_count, self.config.min_parallelism, now);
        }

        state.maybe_idle_reset(now);
        state.maybe_promote_stale_last_known_good(now);

        state.current
    }

    /// Records a successful batch completion of wall-clock `duration`.
    pub fn record_batch_completion(&self, duration: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate controller mutex poisoned");
        state.last_activity_time = now;

        let duration_ms = duration.as_secs_f64() * 1000.0;
        let instantaneous_rate = if duration.as_secs_f64() > 0.0 {
            1.0 / duration.as_secs_f64()
        } else {
            constants::MEASUREMENT_ARTIFACT_RATE_PER_SEC
        };

        state.batch_duration_ema_ms = Some(match state.batch_duration_ema_ms {
            Some(prev) => constants::EMA_ALPHA * duration_ms + (1.0 - constants::EMA_ALPHA) * prev,
            None => duration_ms,
        });
        state.batch_rate_ema = Some(match state.batch_rate_ema {
            Some(prev) => constants::EMA_ALPHA * instantaneous_rate + (1.0 - constants::EMA_ALPHA) * prev,
            None => instantaneous_rate,
        });
        state.min_batch_duration_ms = Some(match state.min_batch_duration_ms {
            Some(prev) => prev.min(duration_ms),
            None => duration_ms,
        });

        state.batch_samples += 1;
        state.batches_since_throttle += 1;
        state.total_successful_batches += 1;

        if state.batch_samples >= constants::INITIAL_CEILING_SAMPLE_THRESHOLD {
            state.recompute_derived_ceilings(&self.config);
        }

        self.maybe_increase(&mut state, now);
    }

    fn maybe_increase(&self, state: &mut RateState, now: Instant) {
        let effective_ceiling = state.effective_ceiling(now);

        let stabilized = state.batches_since_throttle >= self.config.stabilization as u64;
        let increase_interval_elapsed = state
            .last_increase_time
            .map(|t| now.saturating_duration_since(t) >= self.config.min_increase_interval)
            .unwrap_or(true);
        let cooldown_elapsed = state
            .last_throttle_time
            .map(|t| now.saturating_duration_since(t) >= constants::RECOVERY_COOLDOWN)
            .unwrap_or(true);
        let rate = state.batch_rate_ema.unwrap_or(0.0);
        let rate_gate_satisfied =
            rate < constants::HARD_RATE_CAP_PER_SEC || rate >= constants::MEASUREMENT_ARTIFACT_RATE_PER_SEC;
        let below_ceiling = state.current < effective_ceiling;

        if !(stabilized && increase_interval_elapsed && cooldown_elapsed && rate_gate_satisfied && below_ceiling) {
            return;
        }

        let mut increase = if state.total_successful_batches >= constants::SUCCESSFUL_BATCHES_THRESHOLD
            || state.has_had_first_throttle
        {
            constants::INCREASE_RATE.max(state.floor)
        } else {
            constants::INCREASE_RATE
        };

        if state.current < state.last_known_good && self.config.aggressive_recovery_ramp {
            increase = ((increase as f64) * constants::RECOVERY_MULTIPLIER) as usize;
        }

        let new_current = (state.current + increase).min(effective_ceiling);
        if new_current != state.current {
            state.current = new_current;
            state.batches_since_throttle = 0;
            state.last_increase_time = Some(now);
            #[cfg(feature = "tracing")]
            debug!(current = state.current, "rate controller increased parallelism");
            #[cfg(feature = "metrics")]
            metrics::gauge!("rate_controller_current_parallelism").set(state.current as f64);
        }
    }

    /// Records a throttle fault with server-indicated `retry_after`.
    pub fn record_throttle(&self, retry_after: Duration) {
        let now = Instant::now();
        let mut state = self.state.lock().expect("rate controller mutex poisoned");
        state.last_activity_time = now;
        state.total_throttle_events += 1;
        state.last_throttle_time = Some(now);
        state.has_had_first_throttle = true;

        let debounced = state
            .last_throttle_processed
            .map(|t| now.saturating_duration_since(t) < constants::DEBOUNCE_WINDOW)
            .unwrap_or(false);

        if debounced {
            #[cfg(feature = "tracing")]
            debug!("throttle debounced, not re-applying decrease");
            return;
        }
        state.last_throttle_processed = Some(now);

        if state.current != state.floor {
            let overshoot =
                retry_after.as_secs_f64() / constants::RETRY_AFTER_NORMALIZATION_WINDOW_SECS;
            let reduction_factor = (1.0 - overshoot / 2.0).clamp(0.5, 1.0);
            let base = (state.current as f64).max(state.throttle_ceiling.unwrap_or(0.0));
            state.throttle_ceiling = Some((state.floor as f64).max(base * reduction_factor));
            state.throttle_ceiling_expiry =
                Some(now + retry_after + constants::THROTTLE_CEILING_GRACE);
        }

        state.last_known_good = state.floor.max(state.current.saturating_sub(constants::INCREASE_RATE));

        state.current = state.floor.max(
            ((state.current as f64) * self.config.decrease_factor).floor() as usize,
        );
        state.batches_since_throttle = 0;

        #[cfg(feature = "tracing")]
        debug!(current = state.current, retry_after = ?retry_after, "rate controller decreased parallelism");
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("rate_controller_throttle_events_total").increment(1);
            metrics::gauge!("rate_controller_current_parallelism").set(state.current as f64);
        }
    }

    /// Resets to an uninitialized state; the next `get_parallelism` call
    /// reinitializes bounds from scratch.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("rate controller mutex poisoned");
        *state = RateState::uninitialized(Instant::now());
    }

    pub fn get_statistics(&self) -> RateStatistics {
        let now = Instant::now();
        let state = self.state.lock().expect("rate controller mutex poisoned");
        RateStatistics {
            current: state.current,
            floor: state.floor,
            ceiling: state.ceiling,
            connection_count: state.connection_count,
            last_known_good: state.last_known_good,
            batches_since_throttle: state.batches_since_throttle,
            total_throttle_events: state.total_throttle_events,
            total_successful_batches: state.total_successful_batches,
            batch_samples: state.batch_samples,
            has_had_first_throttle: state.has_had_first_throttle,
            throttle_ceiling: state.throttle_ceiling.map(|c| c.floor() as usize),
            throttle_ceiling_active: state
                .throttle_ceiling_expiry
                .is_some_and(|expiry| now < expiry),
            batch_duration_ema: state.batch_duration_ema_ms.map(Duration::from_secs_f64_checked_ms),
            min_observed_batch_duration: state.min_batch_duration_ms.map(Duration::from_secs_f64_checked_ms),
            batch_rate_ema_per_sec: state.batch_rate_ema,
        }
    }
}

/// Small helper trait avoiding a direct dependency on an external duration
/// crate just to convert milliseconds to a `Duration`.
trait FromMillisF64 {
    fn from_secs_f64_checked_ms(ms: f64) -> Duration;
}

impl FromMillisF64 for Duration {
    fn from_secs_f64_checked_ms(ms: f64) -> Duration {
        Duration::from_secs_f64((ms / 1000.0).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Preset, RateControllerConfigBuilder};

    fn controller_with_stabilization_1() -> RateController {
        let config = RateControllerConfigBuilder::from_preset(Preset::Balanced)
            .stabilization(1)
            .min_increase_interval(Duration::ZERO)
            .build();
        RateController::new(config)
    }

    #[test]
    fn first_call_initializes_floor_and_ceiling() {
        let controller = controller_with_stabilization_1();
        let current = controller.get_parallelism(8, 1);
        assert_eq!(current, 8);
        let stats = controller.get_statistics();
        assert_eq!(stats.floor, 8);
        assert_eq!(stats.ceiling, 52);
    }

    #[test]
    fn sustained_success_increases_parallelism_monotonically() {
        let controller = controller_with_stabilization_1();
        controller.get_parallelism(8, 1);
        let mut prev = controller.get_statistics().current;
        for _ in 0..20 {
            controller.record_batch_completion(Duration::from_millis(500));
            std::thread::sleep(Duration::from_micros(1));
            let current = controller.get_statistics().current;
            assert!(current >= prev);
            prev = current;
        }
        assert!(prev > 8);
    }

    #[test]
    fn throttle_above_floor_decreases_and_respects_floor() {
        let controller = controller_with_stabilization_1();
        controller.get_parallelism(8, 1);
        for _ in 0..20 {
            controller.record_batch_completion(Duration::from_millis(500));
        }
        let before = controller.get_statistics().current;
        assert!(before > 8);
        controller.record_throttle(Duration::from_secs(30));
        let after = controller.get_statistics().current;
        assert!(after <= (before as f64 * 0.5).ceil() as usize + 1);
        assert!(after >= 8);
    }

    #[test]
    fn debounce_counts_but_does_not_double_decrease() {
        let controller = controller_with_stabilization_1();
        controller.get_parallelism(8, 1);
        for _ in 0..20 {
            controller.record_batch_completion(Duration::from_millis(500));
        }
        controller.record_throttle(Duration::from_secs(30));
        let after_first = controller.get_statistics().current;
        controller.record_throttle(Duration::from_secs(30));
        let after_second = controller.get_statistics().current;
        assert_eq!(after_first, after_second);
        assert_eq!(controller.get_statistics().total_throttle_events, 2);
    }

    #[test]
    fn floor_protection_does_not_lower_throttle_ceiling_at_floor() {
        let controller = controller_with_stabilization_1();
        controller.get_parallelism(8, 1);
        controller.record_throttle(Duration::from_secs(30));
        assert!(controller.get_statistics().throttle_ceiling.is_none());
    }

    #[test]
    fn reset_clears_to_uninitialized() {
        let controller = controller_with_stabilization_1();
        controller.get_parallelism(8, 1);
        controller.record_batch_completion(Duration::from_millis(500));
        controller.reset();
        let current = controller.get_parallelism(8, 1);
        assert_eq!(current, 8);
    }
}
