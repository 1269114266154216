use std::sync::Arc;
use std::time::Duration;

use pool_core::{EventListeners, FnListener, SourceName};

use crate::events::PoolEvent;
use crate::strategy::{SelectionStrategy, ThrottleAware};

/// Tunable configuration for a [`crate::Pool`]. See the field-level docs for
/// defaults; all of them mirror the base behavior's documented figures.
pub struct PoolConfig {
    pub(crate) acquire_timeout: Duration,
    pub(crate) max_idle_time: Duration,
    pub(crate) max_lifetime: Duration,
    pub(crate) disable_affinity_cookie: bool,
    pub(crate) selection_strategy: Arc<dyn SelectionStrategy>,
    pub(crate) validation_interval: Duration,
    pub(crate) enable_validation: bool,
    pub(crate) validate_on_checkout: bool,
    pub(crate) max_connection_retries: u32,
    pub(crate) max_retry_after_tolerance: Option<Duration>,
    pub(crate) max_pool_size: usize,
    pub(crate) event_listeners: EventListeners<PoolEvent>,
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }
}

/// Plain-data twin of [`PoolConfig`]'s scalar fields, for hosts that load
/// configuration from a file or environment rather than building it in
/// code. Excludes [`PoolConfigBuilder::selection_strategy`] and the event
/// listener callbacks, neither of which is serializable; apply it onto a
/// builder with [`PoolConfigBuilder::apply_data`] to fill in the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfigData {
    pub acquire_timeout: Duration,
    pub max_idle_time: Duration,
    pub max_lifetime: Duration,
    pub disable_affinity_cookie: bool,
    pub validation_interval: Duration,
    pub enable_validation: bool,
    pub validate_on_checkout: bool,
    pub max_connection_retries: u32,
    pub max_retry_after_tolerance: Option<Duration>,
    pub max_pool_size: usize,
}

impl Default for PoolConfigData {
    fn default() -> Self {
        let defaults = PoolConfigBuilder::new();
        PoolConfigData {
            acquire_timeout: defaults.acquire_timeout,
            max_idle_time: defaults.max_idle_time,
            max_lifetime: defaults.max_lifetime,
            disable_affinity_cookie: defaults.disable_affinity_cookie,
            validation_interval: defaults.validation_interval,
            enable_validation: defaults.enable_validation,
            validate_on_checkout: defaults.validate_on_checkout,
            max_connection_retries: defaults.max_connection_retries,
            max_retry_after_tolerance: defaults.max_retry_after_tolerance,
            max_pool_size: defaults.max_pool_size,
        }
    }
}

pub struct PoolConfigBuilder {
    acquire_timeout: Duration,
    max_idle_time: Duration,
    max_lifetime: Duration,
    disable_affinity_cookie: bool,
    selection_strategy: Arc<dyn SelectionStrategy>,
    validation_interval: Duration,
    enable_validation: bool,
    validate_on_checkout: bool,
    max_connection_retries: u32,
    max_retry_after_tolerance: Option<Duration>,
    max_pool_size: usize,
    event_listeners: EventListeners<PoolEvent>,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
            max_idle_time: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            disable_affinity_cookie: true,
            selection_strategy: Arc::new(ThrottleAware::new()),
            validation_interval: Duration::from_secs(60),
            enable_validation: true,
            validate_on_checkout: true,
            max_connection_retries: 2,
            max_retry_after_tolerance: None,
            max_pool_size: 0,
            event_listeners: EventListeners::new(),
        }
    }

    pub fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }

    pub fn max_idle_time(mut self, value: Duration) -> Self {
        self.max_idle_time = value;
        self
    }

    pub fn max_lifetime(mut self, value: Duration) -> Self {
        self.max_lifetime = value;
        self
    }

    pub fn disable_affinity_cookie(mut self, value: bool) -> Self {
        self.disable_affinity_cookie = value;
        self
    }

    pub fn selection_strategy(mut self, strategy: impl SelectionStrategy + 'static) -> Self {
        self.selection_strategy = Arc::new(strategy);
        self
    }

    pub fn validation_interval(mut self, value: Duration) -> Self {
        self.validation_interval = value;
        self
    }

    pub fn enable_validation(mut self, value: bool) -> Self {
        self.enable_validation = value;
        self
    }

    pub fn validate_on_checkout(mut self, value: bool) -> Self {
        self.validate_on_checkout = value;
        self
    }

    pub fn max_connection_retries(mut self, value: u32) -> Self {
        self.max_connection_retries = value;
        self
    }

    pub fn max_retry_after_tolerance(mut self, value: Option<Duration>) -> Self {
        self.max_retry_after_tolerance = value;
        self
    }

    /// Override for total admission capacity. `0` (the default) derives
    /// capacity from the sum of each source's recommended parallelism; a
    /// non-zero override affects only the admission semaphore, leaving each
    /// source's own `max_pool_size` queue cap independent.
    pub fn max_pool_size(mut self, value: usize) -> Self {
        self.max_pool_size = value;
        self
    }

    /// Overwrites every scalar field with values loaded from a
    /// [`PoolConfigData`], leaving the selection strategy and event
    /// listeners already set on this builder untouched.
    pub fn apply_data(mut self, data: PoolConfigData) -> Self {
        self.acquire_timeout = data.acquire_timeout;
        self.max_idle_time = data.max_idle_time;
        self.max_lifetime = data.max_lifetime;
        self.disable_affinity_cookie = data.disable_affinity_cookie;
        self.validation_interval = data.validation_interval;
        self.enable_validation = data.enable_validation;
        self.validate_on_checkout = data.validate_on_checkout;
        self.max_connection_retries = data.max_connection_retries;
        self.max_retry_after_tolerance = data.max_retry_after_tolerance;
        self.max_pool_size = data.max_pool_size;
        self
    }

    pub fn on_checkout_granted<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceName, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::CheckoutGranted { source, wait, .. } = event {
                f(source, *wait);
            }
        }));
        self
    }

    pub fn on_checkout_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::CheckoutRejected { reason, .. } = event {
                f(reason);
            }
        }));
        self
    }

    pub fn on_handle_created<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceName) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::HandleCreated { source, .. } = event {
                f(source);
            }
        }));
        self
    }

    pub fn on_handle_disposed<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceName, &str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::HandleDisposed { source, reason, .. } = event {
                f(source, reason);
            }
        }));
        self
    }

    pub fn on_throttle_recorded<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceName, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::ThrottleRecorded { source, retry_after, .. } = event {
                f(source, *retry_after);
            }
        }));
        self
    }

    pub fn on_seed_invalidated<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceName) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::SeedInvalidated { source, .. } = event {
                f(source);
            }
        }));
        self
    }

    pub fn on_validation_pass_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &PoolEvent| {
            if let PoolEvent::ValidationPassCompleted { disposed_count, .. } = event {
                f(*disposed_count);
            }
        }));
        self
    }

    pub fn build(self) -> PoolConfig {
        PoolConfig {
            acquire_timeout: self.acquire_timeout,
            max_idle_time: self.max_idle_time,
            max_lifetime: self.max_lifetime,
            disable_affinity_cookie: self.disable_affinity_cookie,
            selection_strategy: self.selection_strategy,
            validation_interval: self.validation_interval,
            enable_validation: self.enable_validation,
            validate_on_checkout: self.validate_on_checkout,
            max_connection_retries: self.max_connection_retries,
            max_retry_after_tolerance: self.max_retry_after_tolerance,
            max_pool_size: self.max_pool_size,
            event_listeners: self.event_listeners,
        }
    }
}
