//! Event system for pool observability.
//!
//! Every component in this workspace (the throttle tracker, the rate controller,
//! the connection pool itself) emits a small, typed event enum through the same
//! listener machinery defined here, rather than baking a specific logging or
//! metrics backend into the core types.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Marker trait for events emitted by a pool component.
pub trait PoolEvent: fmt::Debug + Send + Sync + 'static {
    /// Short, stable name for this event's variant (used in log fields).
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;
}

/// Receives events emitted by a pool component.
pub trait EventListener<E: PoolEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A type-erased, shareable event listener.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A closure-backed [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: PoolEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

/// A collection of listeners for one event type, invoked in registration order.
///
/// Emission is panic-safe: a listener that panics cannot poison the pool's own
/// control flow. The panic is caught, logged if the `tracing` feature is on, and
/// the remaining listeners still run.
#[derive(Clone)]
pub struct EventListeners<E: PoolEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: PoolEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PoolEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L: EventListener<E> + 'static>(&mut self, listener: L) {
        self.listeners.push(Arc::new(listener));
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let listener = Arc::clone(listener);
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                #[cfg(feature = "tracing")]
                warn!(event_type = event.event_type(), "pool event listener panicked");
                #[cfg(feature = "metrics")]
                metrics::counter!("pool_event_listener_panics_total").increment(1);
                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = event;
            }
        }
    }
}

impl<E: PoolEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}
