use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::{Duration, Instant};

use client_source::{ClientSource, Dispatchable};
use pool_core::{PoolError, PoolEvent as PoolEventTrait, SourceName};
use rate_controller::{RateController, RateControllerConfig};
use thiserror::Error;
use throttle_detector::{FaultClass, FaultClassifier};
use throttle_tracker::ThrottleTracker;
use tokio::sync::Semaphore;

use crate::config::PoolConfig;
use crate::events::PoolEvent;
use crate::handle::{PooledEntry, PooledHandle};
use crate::strategy::SourceSnapshot;

static TUNING_INIT: Once = Once::new();

const FALLBACK_SERVER_HINT: usize = 4;
const THROTTLE_WAIT_PADDING: Duration = Duration::from_millis(100);

/// An error from [`Pool::get_client`] or [`Pool::execute`] that additionally
/// distinguishes caller-initiated cancellation from the pool's own typed
/// errors — cancellation is not a [`PoolError`] variant, since it is never
/// surfaced by the remote service or the pool's own admission logic.
#[derive(Debug, Error)]
pub enum OperationError<E> {
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Pool(PoolError<E>),
}

impl<E> From<PoolError<E>> for OperationError<E> {
    fn from(value: PoolError<E>) -> Self {
        OperationError::Pool(value)
    }
}

pub(crate) struct SourceState<H: Dispatchable> {
    pub(crate) client_source: Arc<dyn ClientSource<Handle = H>>,
    pub(crate) queue: StdMutex<VecDeque<PooledEntry<H>>>,
    pub(crate) active_count: AtomicUsize,
    pub(crate) requests_served: AtomicU64,
    pub(crate) server_hint: AtomicUsize,
}

impl<H: Dispatchable> SourceState<H> {
    fn max_pool_size(&self) -> usize {
        self.client_source.max_pool_size()
    }
}

/// Per-source and totals snapshot returned by [`Pool::statistics`].
#[derive(Debug, Clone)]
pub struct SourceStatistics {
    pub name: SourceName,
    pub active: usize,
    pub idle: usize,
    pub is_throttled: bool,
    pub requests_served: u64,
}

#[derive(Debug, Clone)]
pub struct PoolStatistics {
    pub total_capacity: usize,
    pub in_flight: usize,
    pub total_requests_served: u64,
    pub invalid_handle_count: u64,
    pub sources: Vec<SourceStatistics>,
}

pub(crate) struct PoolInner<H: Dispatchable> {
    sources: Vec<SourceState<H>>,
    tracker: ThrottleTracker,
    rate_controller: RateController,
    classifier: Arc<dyn FaultClassifier<H::Fault>>,
    semaphore: Arc<Semaphore>,
    total_capacity: usize,
    config: PoolConfig,
    invalid_count: AtomicU64,
    auth_failure_count: AtomicU64,
    connection_failure_count: AtomicU64,
    disposed: AtomicBool,
    validation_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<H: Dispatchable> PoolInner<H> {
    fn source_index(&self, name: &SourceName) -> Option<usize> {
        self.sources.iter().position(|s| s.client_source.name() == name)
    }

    fn emit(&self, event: PoolEvent) {
        self.config.event_listeners.emit(&event);
        #[cfg(feature = "tracing")]
        tracing::debug!(event_type = event.event_type(), "pool event");
        #[cfg(feature = "metrics")]
        match &event {
            PoolEvent::CheckoutGranted { .. } => {
                metrics::counter!("connection_pool_checkouts_granted_total").increment(1)
            }
            PoolEvent::CheckoutRejected { .. } => {
                metrics::counter!("connection_pool_checkouts_rejected_total").increment(1)
            }
            PoolEvent::HandleCreated { .. } => {
                metrics::counter!("connection_pool_handles_created_total").increment(1)
            }
            PoolEvent::HandleDisposed { .. } => {
                metrics::counter!("connection_pool_handles_disposed_total").increment(1)
            }
            PoolEvent::ThrottleRecorded { .. } => {
                metrics::counter!("connection_pool_throttles_recorded_total").increment(1)
            }
            PoolEvent::SeedInvalidated { .. } => {
                metrics::counter!("connection_pool_seed_invalidations_total").increment(1)
            }
            PoolEvent::ValidationPassCompleted { .. } => {
                metrics::counter!("connection_pool_validation_passes_total").increment(1)
            }
        }
    }

    /// Called by [`PooledHandle::drop`]; implements §4.5.4 return semantics.
    pub(crate) fn finish_checkout(&self, source: &SourceName, mut entry: PooledEntry<H>) {
        let Some(index) = self.source_index(source) else {
            return;
        };
        let state = &self.sources[index];
        state.active_count.fetch_sub(1, Ordering::AcqRel);

        if entry.is_invalid {
            self.invalid_count.fetch_add(1, Ordering::Relaxed);
            self.emit(PoolEvent::HandleDisposed {
                source: source.clone(),
                reason: entry.invalid_reason.unwrap_or_else(|| "invalid".to_string()),
                timestamp: Instant::now(),
            });
            return;
        }

        entry.reset();
        let mut queue = state.queue.lock().expect("source queue mutex poisoned");
        if queue.len() < state.max_pool_size() {
            queue.push_back(entry);
        } else {
            drop(queue);
            self.emit(PoolEvent::HandleDisposed {
                source: source.clone(),
                reason: "queue at source capacity".to_string(),
                timestamp: Instant::now(),
            });
        }
    }
}

/// A pooled, throttle-aware connection manager over a set of named sources.
pub struct Pool<H: Dispatchable> {
    inner: Arc<PoolInner<H>>,
}

impl<H: Dispatchable> Clone for Pool<H> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<H: Dispatchable> Pool<H> {
    pub async fn new(
        sources: Vec<Arc<dyn ClientSource<Handle = H>>>,
        config: PoolConfig,
        rate_controller_config: RateControllerConfig,
        classifier: Arc<dyn FaultClassifier<H::Fault>>,
    ) -> Result<Self, PoolError<H::Fault>> {
        if sources.is_empty() {
            return Err(PoolError::ConfigurationInvalid {
                message: "at least one source must be configured".to_string(),
            });
        }

        TUNING_INIT.call_once(|| {
            #[cfg(feature = "metrics")]
            {
                metrics::describe_counter!(
                    "connection_pool_checkouts_granted_total",
                    "Checkouts granted by the connection pool"
                );
                metrics::describe_counter!(
                    "connection_pool_checkouts_rejected_total",
                    "Checkouts rejected by the connection pool"
                );
            }
        });

        let mut source_states = Vec::with_capacity(sources.len());
        let mut total_capacity = 0usize;
        for client_source in sources {
            let server_hint = match client_source.get_seed_client().await {
                Ok(seed) => seed.recommended_dop().unwrap_or(FALLBACK_SERVER_HINT),
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(source = %client_source.name(), error = %_err, "seed initialization failed, using fallback parallelism");
                    FALLBACK_SERVER_HINT
                }
            };
            total_capacity += server_hint;
            source_states.push(SourceState {
                client_source,
                queue: StdMutex::new(VecDeque::new()),
                active_count: AtomicUsize::new(0),
                requests_served: AtomicU64::new(0),
                server_hint: AtomicUsize::new(server_hint),
            });
        }

        let total_capacity = if config.max_pool_size > 0 {
            config.max_pool_size
        } else {
            total_capacity
        };

        for state in &source_states {
            if let Ok(seed) = state.client_source.get_seed_client().await {
                if let Ok(clone) = seed.clone_handle().await {
                    if config.disable_affinity_cookie {
                        clone.disable_affinity_cookie();
                    }
                    state.queue.lock().expect("source queue mutex poisoned").push_back(PooledEntry::new(clone));
                }
            }
        }

        let inner = Arc::new(PoolInner {
            sources: source_states,
            tracker: ThrottleTracker::new(),
            rate_controller: RateController::new(rate_controller_config),
            classifier,
            semaphore: Arc::new(Semaphore::new(total_capacity)),
            total_capacity,
            invalid_count: AtomicU64::new(0),
            auth_failure_count: AtomicU64::new(0),
            connection_failure_count: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            validation_task: StdMutex::new(None),
            config,
        });

        if inner.config.enable_validation {
            let validation_inner = Arc::clone(&inner);
            let interval = inner.config.validation_interval;
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if validation_inner.disposed.load(Ordering::Acquire) {
                        return;
                    }
                    run_validation_pass(&validation_inner).await;
                }
            });
            *inner.validation_task.lock().expect("validation task mutex poisoned") = Some(task);
        }

        Ok(Self { inner })
    }

    pub fn is_enabled(&self) -> bool {
        !self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn source_count(&self) -> usize {
        self.inner.sources.len()
    }

    /// Pool-wide admission cap as the adaptive rate controller currently
    /// sees it: the same `GetParallelism` read path it exposes on its own,
    /// fed with this pool's static total capacity averaged across its
    /// sources. Distinct from the semaphore's own permit count, which is
    /// sized once at construction and never resized — this value only ever
    /// reports the controller's recommendation for callers that want to
    /// self-limit ahead of the pool (e.g. a batching layer choosing a batch
    /// size), it does not gate checkout itself.
    pub fn get_total_recommended_parallelism(&self) -> usize {
        let connection_count = self.inner.sources.len().max(1);
        let server_hint_per_source = self.inner.total_capacity / connection_count;
        self.inner.rate_controller.get_parallelism(server_hint_per_source, connection_count)
    }

    /// Static per-source parallelism hint reported by that source's handle
    /// at seed time, used internally for checkout headroom checks. Unlike
    /// [`Pool::get_total_recommended_parallelism`] this never moves with
    /// the rate controller; it reflects what the source itself advertised.
    pub fn get_live_source_dop(&self, name: &SourceName) -> Option<usize> {
        let index = self.inner.source_index(name)?;
        Some(self.inner.sources[index].server_hint.load(Ordering::Relaxed))
    }

    pub fn get_active_connection_count(&self, name: &SourceName) -> Option<usize> {
        let index = self.inner.source_index(name)?;
        Some(self.inner.sources[index].active_count.load(Ordering::Relaxed))
    }

    pub fn record_auth_failure(&self) {
        self.inner.auth_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.inner.connection_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn statistics(&self) -> PoolStatistics {
        let sources = self
            .inner
            .sources
            .iter()
            .map(|s| SourceStatistics {
                name: s.client_source.name().clone(),
                active: s.active_count.load(Ordering::Relaxed),
                idle: s.queue.lock().expect("source queue mutex poisoned").len(),
                is_throttled: self.inner.tracker.is_throttled(s.client_source.name()),
                requests_served: s.requests_served.load(Ordering::Relaxed),
            })
            .collect::<Vec<_>>();
        let in_flight = self.inner.total_capacity - self.inner.semaphore.available_permits();
        PoolStatistics {
            total_capacity: self.inner.total_capacity,
            in_flight,
            total_requests_served: sources.iter().map(|s| s.requests_served).sum(),
            invalid_handle_count: self.inner.invalid_count.load(Ordering::Relaxed),
            sources,
        }
    }

    fn snapshot_candidates(&self, exclude: Option<&SourceName>) -> Vec<SourceSnapshot> {
        self.inner
            .sources
            .iter()
            .filter(|s| exclude.map_or(true, |excluded| s.client_source.name() != excluded))
            .map(|s| {
                let name = s.client_source.name().clone();
                let is_throttled = self.inner.tracker.is_throttled(&name);
                let remaining = self
                    .inner
                    .tracker
                    .get_throttle_expiry(&name)
                    .map(|expiry| expiry.saturating_duration_since(Instant::now()))
                    .unwrap_or(Duration::ZERO);
                SourceSnapshot {
                    name,
                    active: s.active_count.load(Ordering::Relaxed),
                    is_throttled,
                    throttle_remaining: remaining,
                }
            })
            .collect()
    }

    async fn wait_for_non_throttled(&self, exclude: Option<&SourceName>) -> Result<(), PoolError<H::Fault>> {
        let mut waited = Duration::ZERO;
        loop {
            let candidates = self.snapshot_candidates(exclude);
            if candidates.iter().any(|c| !c.is_throttled) {
                return Ok(());
            }
            let shortest = candidates
                .iter()
                .map(|c| c.throttle_remaining)
                .min()
                .unwrap_or(Duration::ZERO);
            let sleep_for = shortest + THROTTLE_WAIT_PADDING;

            if let Some(tolerance) = self.inner.config.max_retry_after_tolerance {
                if waited + sleep_for > tolerance {
                    self.inner.emit(PoolEvent::CheckoutRejected {
                        reason: "retry-after tolerance exceeded".to_string(),
                        timestamp: Instant::now(),
                    });
                    return Err(PoolError::ServiceProtection { waited, tolerance });
                }
            }

            tokio::time::sleep(sleep_for).await;
            waited += sleep_for;
        }
    }

    /// Non-cancellable checkout.
    pub async fn get_client(&self, exclude_source: Option<&SourceName>) -> Result<PooledHandle<H>, PoolError<H::Fault>> {
        match self.get_client_cancellable(exclude_source, futures::future::pending()).await {
            Ok(handle) => Ok(handle),
            Err(OperationError::Pool(err)) => Err(err),
            Err(OperationError::Cancelled) => unreachable!("pending() future never completes"),
        }
    }

    /// Cancellable checkout implementing the two-phase admission protocol.
    pub async fn get_client_cancellable(
        &self,
        exclude_source: Option<&SourceName>,
        cancellation: impl std::future::Future<Output = ()>,
    ) -> Result<PooledHandle<H>, OperationError<H::Fault>> {
        tokio::pin!(cancellation);
        let started = Instant::now();
        let mut connection_retries = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = &mut cancellation => return Err(OperationError::Cancelled),
                result = self.wait_for_non_throttled(exclude_source) => { result?; }
            }

            let semaphore = Arc::clone(&self.inner.semaphore);
            let permit = tokio::select! {
                biased;
                _ = &mut cancellation => return Err(OperationError::Cancelled),
                result = tokio::time::timeout(self.inner.config.acquire_timeout, semaphore.acquire_owned()) => {
                    match result {
                        Ok(Ok(permit)) => permit,
                        Ok(Err(_)) => return Err(OperationError::Pool(PoolError::PoolExhausted {
                            active: self.inner.total_capacity,
                            capacity: self.inner.total_capacity,
                            timeout: self.inner.config.acquire_timeout,
                        })),
                        Err(_) => {
                            let active = self.inner.total_capacity - self.inner.semaphore.available_permits();
                            self.inner.emit(PoolEvent::CheckoutRejected {
                                reason: "acquire timeout".to_string(),
                                timestamp: Instant::now(),
                            });
                            return Err(OperationError::Pool(PoolError::PoolExhausted {
                                active,
                                capacity: self.inner.total_capacity,
                                timeout: self.inner.config.acquire_timeout,
                            }));
                        }
                    }
                }
            };

            let candidates = self.snapshot_candidates(exclude_source);
            let Some(selected) = self.inner.config.selection_strategy.select(&candidates) else {
                drop(permit);
                return Err(OperationError::Pool(PoolError::ConfigurationInvalid {
                    message: "no eligible source available".to_string(),
                }));
            };

            if self.inner.tracker.is_throttled(&selected) {
                drop(permit);
                continue;
            }

            let index = self.inner.source_index(&selected).expect("selected source exists");
            let state = &self.inner.sources[index];

            let entry = loop {
                let dequeued = state.queue.lock().expect("source queue mutex poisoned").pop_front();
                match dequeued {
                    Some(mut candidate) => {
                        let now = Instant::now();
                        let expired = candidate.is_expired(self.inner.config.max_idle_time, self.inner.config.max_lifetime, now);
                        let ready = !self.inner.config.validate_on_checkout || candidate.handle.is_ready();
                        if expired || !ready || candidate.is_invalid {
                            candidate.mark_invalid("failed validation on checkout");
                            self.inner.invalid_count.fetch_add(1, Ordering::Relaxed);
                            self.inner.emit(PoolEvent::HandleDisposed {
                                source: selected.clone(),
                                reason: "failed validation on checkout".to_string(),
                                timestamp: Instant::now(),
                            });
                            continue;
                        }
                        break Some(candidate);
                    }
                    None => break None,
                }
            };

            let entry = match entry {
                Some(entry) => entry,
                None => {
                    if self.inner.tracker.is_throttled(&selected) {
                        drop(permit);
                        continue;
                    }
                    match state.client_source.get_seed_client().await {
                        Ok(seed) => match seed.clone_handle().await {
                            Ok(handle) => {
                                if self.inner.config.disable_affinity_cookie {
                                    handle.disable_affinity_cookie();
                                }
                                self.inner.emit(PoolEvent::HandleCreated {
                                    source: selected.clone(),
                                    timestamp: Instant::now(),
                                });
                                PooledEntry::new(handle)
                            }
                            Err(_fault) => {
                                drop(permit);
                                self.record_connection_failure();
                                if connection_retries >= self.inner.config.max_connection_retries {
                                    return Err(OperationError::Pool(PoolError::ConnectionFailed {
                                        source: selected.clone(),
                                        reason: "clone_handle failed after exhausting max_connection_retries".to_string(),
                                    }));
                                }
                                connection_retries += 1;
                                continue;
                            }
                        },
                        Err(seed_error) => {
                            drop(permit);
                            self.record_connection_failure();
                            if connection_retries >= self.inner.config.max_connection_retries {
                                return Err(OperationError::Pool(PoolError::ConnectionFailed {
                                    source: selected.clone(),
                                    reason: seed_error.message().to_string(),
                                }));
                            }
                            connection_retries += 1;
                            continue;
                        }
                    }
                }
            };

            state.active_count.fetch_add(1, Ordering::AcqRel);
            state.requests_served.fetch_add(1, Ordering::Relaxed);
            self.inner.emit(PoolEvent::CheckoutGranted {
                source: selected.clone(),
                wait: started.elapsed(),
                timestamp: Instant::now(),
            });

            return Ok(PooledHandle::new(entry, selected, Arc::clone(&self.inner), permit));
        }
    }

    /// Best-effort, non-blocking checkout: succeeds only if some eligible
    /// source currently has DOP headroom and a semaphore slot is free.
    pub async fn try_get_client_with_capacity(&self, exclude_source: Option<&SourceName>) -> Option<PooledHandle<H>> {
        let has_headroom = self.inner.sources.iter().any(|s| {
            exclude_source.map_or(true, |excluded| s.client_source.name() != excluded)
                && s.active_count.load(Ordering::Relaxed) < s.server_hint.load(Ordering::Relaxed)
                && !self.inner.tracker.is_throttled(s.client_source.name())
        });
        if !has_headroom {
            return None;
        }
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;
        drop(permit);
        self.get_client(exclude_source).await.ok()
    }

    pub async fn invalidate_seed(&self, source_name: &SourceName) {
        let Some(index) = self.inner.source_index(source_name) else {
            return;
        };
        let state = &self.inner.sources[index];
        state.client_source.invalidate_seed().await;
        state.queue.lock().expect("source queue mutex poisoned").clear();
        self.inner.emit(PoolEvent::SeedInvalidated {
            source: source_name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Dispatches `request` through a checked-out handle, retrying on
    /// protection-limit throttle faults until success or cancellation. Token
    /// failures invalidate and drain the offending source before propagating.
    pub async fn execute(
        &self,
        request: H::Request,
        cancellation: impl std::future::Future<Output = ()>,
    ) -> Result<H::Response, OperationError<H::Fault>>
    where
        H::Request: Clone,
    {
        tokio::pin!(cancellation);
        loop {
            let mut handle = tokio::select! {
                biased;
                _ = &mut cancellation => return Err(OperationError::Cancelled),
                result = self.get_client_cancellable(None, futures::future::pending()) => result?,
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = &mut cancellation => return Err(OperationError::Cancelled),
                result = handle.execute(request.clone()) => result,
            };

            match outcome {
                Ok(response) => {
                    self.inner.rate_controller.record_batch_completion(started.elapsed());
                    return Ok(response);
                }
                Err(fault) => match self.inner.classifier.classify(&fault) {
                    FaultClass::Throttle { retry_after } => {
                        self.inner.tracker.record_throttle(handle.source_name(), retry_after);
                        self.inner.rate_controller.record_throttle(retry_after);
                        self.inner.emit(PoolEvent::ThrottleRecorded {
                            source: handle.source_name().clone(),
                            retry_after,
                            timestamp: Instant::now(),
                        });
                        drop(handle);
                        continue;
                    }
                    FaultClass::Auth { requires_reauthentication } => {
                        let source = handle.source_name().clone();
                        drop(handle);
                        if requires_reauthentication {
                            self.invalidate_seed(&source).await;
                        }
                        self.record_auth_failure();
                        return Err(OperationError::Pool(PoolError::AuthError {
                            requires_reauthentication,
                            message: pool_core::redact("request failed authentication"),
                        }));
                    }
                    FaultClass::Passthrough => {
                        return Err(OperationError::Pool(PoolError::Application(fault)));
                    }
                },
            }
        }
    }

    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.inner.validation_task.lock().expect("validation task mutex poisoned").take() {
            task.abort();
        }
        for state in &self.inner.sources {
            state.queue.lock().expect("source queue mutex poisoned").clear();
            state.client_source.dispose().await;
        }
        self.inner.semaphore.close();
    }
}

async fn run_validation_pass<H: Dispatchable>(inner: &Arc<PoolInner<H>>) {
    let mut disposed_count = 0usize;
    for state in &inner.sources {
        let drained: Vec<PooledEntry<H>> = {
            let mut queue = state.queue.lock().expect("source queue mutex poisoned");
            queue.drain(..).collect()
        };
        let now = Instant::now();
        let mut kept = VecDeque::with_capacity(drained.len());
        for entry in drained {
            let expired = entry.is_expired(inner.config.max_idle_time, inner.config.max_lifetime, now);
            if expired || entry.is_invalid || !entry.handle.is_ready() {
                disposed_count += 1;
                continue;
            }
            kept.push_back(entry);
        }
        if kept.is_empty() {
            if let Ok(seed) = state.client_source.get_seed_client().await {
                if let Ok(handle) = seed.clone_handle().await {
                    kept.push_back(PooledEntry::new(handle));
                }
            }
        }
        *state.queue.lock().expect("source queue mutex poisoned") = kept;
    }
    inner.emit(PoolEvent::ValidationPassCompleted {
        disposed_count,
        timestamp: Instant::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_source::SeedError;
    use pool_core::SourceName;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use throttle_detector::FnFaultClassifier;

    #[derive(Clone)]
    struct MockHandle {
        dop: Option<usize>,
        calls: Arc<StdAtomicUsize>,
        fail_until: usize,
        affinity_cookie_disabled: Arc<StdAtomicUsize>,
        clone_failures_remaining: Arc<StdAtomicUsize>,
    }

    impl Dispatchable for MockHandle {
        type Request = u32;
        type Response = u32;
        type Fault = MockFault;

        fn execute(&self, req: u32) -> futures::future::BoxFuture<'_, Result<u32, MockFault>> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail_until = self.fail_until;
            Box::pin(async move {
                if attempt < fail_until {
                    Err(MockFault::Throttled)
                } else {
                    Ok(req)
                }
            })
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn recommended_dop(&self) -> Option<usize> {
            self.dop
        }

        fn clone_handle(&self) -> futures::future::BoxFuture<'_, Result<Self, MockFault>> {
            let this = self.clone();
            Box::pin(async move {
                if this.clone_failures_remaining.load(Ordering::SeqCst) > 0 {
                    this.clone_failures_remaining.fetch_sub(1, Ordering::SeqCst);
                    return Err(MockFault::Other);
                }
                Ok(this)
            })
        }

        fn disable_affinity_cookie(&self) {
            self.affinity_cookie_disabled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Clone)]
    enum MockFault {
        Throttled,
        BadAuth,
        Other,
    }

    struct MockSource {
        name: SourceName,
        max_pool_size: usize,
        dop: Option<usize>,
        fail_until: usize,
        creations: Arc<StdAtomicUsize>,
        affinity_cookie_disabled: Arc<StdAtomicUsize>,
        seed_failures_remaining: Arc<StdAtomicUsize>,
        clone_failures_remaining: Arc<StdAtomicUsize>,
    }

    impl ClientSource for MockSource {
        type Handle = MockHandle;

        fn name(&self) -> &SourceName {
            &self.name
        }

        fn max_pool_size(&self) -> usize {
            self.max_pool_size
        }

        fn get_seed_client(&self) -> futures::future::BoxFuture<'_, Result<Arc<MockHandle>, SeedError>> {
            self.creations.fetch_add(1, Ordering::Relaxed);
            let dop = self.dop;
            let fail_until = self.fail_until;
            let affinity_cookie_disabled = Arc::clone(&self.affinity_cookie_disabled);
            let seed_failures_remaining = Arc::clone(&self.seed_failures_remaining);
            let clone_failures_remaining = Arc::clone(&self.clone_failures_remaining);
            Box::pin(async move {
                if seed_failures_remaining.load(Ordering::SeqCst) > 0 {
                    seed_failures_remaining.fetch_sub(1, Ordering::SeqCst);
                    return Err(SeedError::new(
                        client_source::SeedErrorKind::NetworkError,
                        "seed creation refused by test source",
                    ));
                }
                Ok(Arc::new(MockHandle {
                    dop,
                    calls: Arc::new(StdAtomicUsize::new(0)),
                    fail_until,
                    affinity_cookie_disabled,
                    clone_failures_remaining,
                }))
            })
        }

        fn invalidate_seed(&self) -> futures::future::BoxFuture<'_, ()> {
            Box::pin(async {})
        }
    }

    fn mock_source(name: &str, dop: usize, max_pool_size: usize) -> Arc<dyn ClientSource<Handle = MockHandle>> {
        Arc::new(MockSource {
            name: SourceName::new(name),
            max_pool_size,
            dop: Some(dop),
            fail_until: 0,
            creations: Arc::new(StdAtomicUsize::new(0)),
            affinity_cookie_disabled: Arc::new(StdAtomicUsize::new(0)),
            seed_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
            clone_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
        })
    }

    fn flaky_source(name: &str, dop: usize, max_pool_size: usize, fail_until: usize) -> Arc<dyn ClientSource<Handle = MockHandle>> {
        Arc::new(MockSource {
            name: SourceName::new(name),
            max_pool_size,
            dop: Some(dop),
            fail_until,
            creations: Arc::new(StdAtomicUsize::new(0)),
            affinity_cookie_disabled: Arc::new(StdAtomicUsize::new(0)),
            seed_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
            clone_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
        })
    }

    /// A source whose seed creation fails a fixed number of times before
    /// succeeding, for exercising `max_connection_retries`.
    fn seed_failing_source(name: &str, dop: usize, max_pool_size: usize, seed_failures: usize) -> Arc<dyn ClientSource<Handle = MockHandle>> {
        Arc::new(MockSource {
            name: SourceName::new(name),
            max_pool_size,
            dop: Some(dop),
            fail_until: 0,
            creations: Arc::new(StdAtomicUsize::new(0)),
            affinity_cookie_disabled: Arc::new(StdAtomicUsize::new(0)),
            seed_failures_remaining: Arc::new(StdAtomicUsize::new(seed_failures)),
            clone_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
        })
    }

    /// A source whose first-handle `clone_handle` call fails a fixed number
    /// of times before succeeding, for exercising `max_connection_retries`
    /// against the clone-failure branch rather than the seed-failure one.
    fn clone_failing_source(name: &str, dop: usize, max_pool_size: usize, clone_failures: usize) -> Arc<dyn ClientSource<Handle = MockHandle>> {
        Arc::new(MockSource {
            name: SourceName::new(name),
            max_pool_size,
            dop: Some(dop),
            fail_until: 0,
            creations: Arc::new(StdAtomicUsize::new(0)),
            affinity_cookie_disabled: Arc::new(StdAtomicUsize::new(0)),
            seed_failures_remaining: Arc::new(StdAtomicUsize::new(0)),
            clone_failures_remaining: Arc::new(StdAtomicUsize::new(clone_failures)),
        })
    }

    fn passthrough_classifier() -> Arc<dyn FaultClassifier<MockFault>> {
        Arc::new(FnFaultClassifier::new(|fault: &MockFault| match fault {
            MockFault::Throttled => FaultClass::Throttle { retry_after: Duration::from_millis(20) },
            MockFault::BadAuth => FaultClass::Auth { requires_reauthentication: true },
            MockFault::Other => FaultClass::Passthrough,
        }))
    }

    async fn single_source_pool(dop: usize, max_pool_size: usize) -> Pool<MockHandle> {
        Pool::new(
            vec![mock_source("org1", dop, max_pool_size)],
            PoolConfig::builder().enable_validation(false).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn checkout_and_drop_returns_handle_to_the_source_queue() {
        let pool = single_source_pool(4, 8).await;
        let handle = pool.get_client(None).await.unwrap();
        let stats = pool.statistics();
        assert_eq!(stats.sources[0].active, 1);
        assert_eq!(stats.sources[0].idle, 0);
        drop(handle);

        let stats = pool.statistics();
        assert_eq!(stats.sources[0].active, 0);
        assert_eq!(stats.sources[0].idle, 1);
        assert_eq!(stats.total_requests_served, 1);
    }

    #[tokio::test]
    async fn semaphore_bounds_concurrent_checkouts_to_total_capacity() {
        let pool = single_source_pool(1, 4).await;
        let first = pool.get_client(None).await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(50), pool.get_client(None)).await;
        assert!(second.is_err(), "second checkout should not be admitted while capacity is exhausted");

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(200), pool.get_client(None))
            .await
            .expect("checkout should succeed once the permit is released");
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn checkout_avoids_a_throttled_source_when_another_is_available() {
        let pool = Pool::new(
            vec![mock_source("org1", 4, 8), mock_source("org2", 4, 8)],
            PoolConfig::builder().enable_validation(false).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        pool.inner.tracker.record_throttle(&SourceName::new("org1"), Duration::from_secs(30));

        for _ in 0..4 {
            let handle = pool.get_client(None).await.unwrap();
            assert_eq!(handle.source_name(), &SourceName::new("org2"));
        }
    }

    #[tokio::test]
    async fn execute_retries_silently_on_throttle_and_surfaces_success() {
        let pool = Pool::new(
            vec![flaky_source("org1", 4, 8, 2)],
            PoolConfig::builder().enable_validation(false).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let result = pool.execute(7u32, futures::future::pending()).await;
        assert_eq!(result.unwrap(), 7);
        assert!(pool.inner.tracker.total_throttle_events() >= 2);
    }

    #[tokio::test]
    async fn invalidate_seed_clears_the_source_queue() {
        let pool = single_source_pool(4, 8).await;
        let handle = pool.get_client(None).await.unwrap();
        drop(handle);
        assert_eq!(pool.statistics().sources[0].idle, 1);

        pool.invalidate_seed(&SourceName::new("org1")).await;
        assert_eq!(pool.statistics().sources[0].idle, 0);
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_stops_admitting_new_work() {
        let pool = single_source_pool(4, 8).await;
        pool.dispose().await;
        pool.dispose().await;
        assert!(!pool.is_enabled());
    }

    // The process-wide tuning guard (`TUNING_INIT`) is a single `Once` shared
    // by every `Pool` in the process, so this runs `#[serial]` to avoid racing
    // other tests that construct a pool concurrently.
    #[tokio::test]
    #[serial_test::serial]
    async fn constructing_multiple_pools_does_not_panic_on_the_shared_tuning_guard() {
        let first = single_source_pool(4, 8).await;
        let second = single_source_pool(4, 8).await;
        assert!(first.is_enabled());
        assert!(second.is_enabled());
    }

    // `Pool::new`'s own warm-up step issues a `get_seed_client` call to read
    // a server hint and a second to populate the warm-up clone, so a
    // `seed_failing_source`'s failure budget is always spent down by 2
    // before a test's own `get_client` call ever runs. The counts below are
    // chosen with that warm-up consumption already netted out.
    #[tokio::test]
    async fn max_connection_retries_recovers_a_seed_failure_within_the_bound() {
        let pool = Pool::new(
            vec![seed_failing_source("org1", 4, 8, 4)],
            PoolConfig::builder().enable_validation(false).max_connection_retries(2).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let handle = pool.get_client(None).await;
        assert!(handle.is_ok(), "two failures should still recover within a bound of 2 retries");
    }

    #[tokio::test]
    async fn max_connection_retries_gives_up_once_the_bound_is_exhausted() {
        let pool = Pool::new(
            vec![seed_failing_source("org1", 4, 8, 5)],
            PoolConfig::builder().enable_validation(false).max_connection_retries(2).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let result = pool.get_client(None).await;
        assert!(matches!(result, Err(PoolError::ConnectionFailed { .. })));
    }

    // Here warm-up only burns one attempt: its own `get_seed_client` call
    // succeeds, so it reaches `clone_handle` and spends exactly one failure
    // from the budget below before the test's own `get_client` call runs.
    #[tokio::test]
    async fn max_connection_retries_also_bounds_clone_handle_failures() {
        let pool = Pool::new(
            vec![clone_failing_source("org1", 4, 8, 4)],
            PoolConfig::builder().enable_validation(false).max_connection_retries(2).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let result = pool.get_client(None).await;
        assert!(matches!(result, Err(PoolError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn disable_affinity_cookie_is_applied_to_a_freshly_created_handle() {
        let pool = Pool::new(
            vec![mock_source("org1", 4, 8)],
            PoolConfig::builder().enable_validation(false).disable_affinity_cookie(true).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let handle = pool.get_client(None).await.unwrap();
        assert_eq!(handle.affinity_cookie_disabled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disable_affinity_cookie_false_leaves_the_handle_untouched() {
        let pool = Pool::new(
            vec![mock_source("org1", 4, 8)],
            PoolConfig::builder().enable_validation(false).disable_affinity_cookie(false).build(),
            RateControllerConfig::builder().build(),
            passthrough_classifier(),
        )
        .await
        .unwrap();

        let handle = pool.get_client(None).await.unwrap();
        assert_eq!(handle.affinity_cookie_disabled.load(Ordering::SeqCst), 0);
    }
}
