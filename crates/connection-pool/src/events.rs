use std::time::{Duration, Instant};

use pool_core::SourceName;

/// Observability events emitted by the pool. Delivered through the same
/// `EventListeners`/`FnListener` machinery used elsewhere in this workspace.
#[derive(Debug)]
pub enum PoolEvent {
    CheckoutGranted {
        source: SourceName,
        wait: Duration,
        timestamp: Instant,
    },
    CheckoutRejected {
        reason: String,
        timestamp: Instant,
    },
    HandleCreated {
        source: SourceName,
        timestamp: Instant,
    },
    HandleDisposed {
        source: SourceName,
        reason: String,
        timestamp: Instant,
    },
    ThrottleRecorded {
        source: SourceName,
        retry_after: Duration,
        timestamp: Instant,
    },
    SeedInvalidated {
        source: SourceName,
        timestamp: Instant,
    },
    ValidationPassCompleted {
        disposed_count: usize,
        timestamp: Instant,
    },
}

impl pool_core::PoolEvent for PoolEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PoolEvent::CheckoutGranted { .. } => "checkout_granted",
            PoolEvent::CheckoutRejected { .. } => "checkout_rejected",
            PoolEvent::HandleCreated { .. } => "handle_created",
            PoolEvent::HandleDisposed { .. } => "handle_disposed",
            PoolEvent::ThrottleRecorded { .. } => "throttle_recorded",
            PoolEvent::SeedInvalidated { .. } => "seed_invalidated",
            PoolEvent::ValidationPassCompleted { .. } => "validation_pass_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PoolEvent::CheckoutGranted { timestamp, .. }
            | PoolEvent::CheckoutRejected { timestamp, .. }
            | PoolEvent::HandleCreated { timestamp, .. }
            | PoolEvent::HandleDisposed { timestamp, .. }
            | PoolEvent::ThrottleRecorded { timestamp, .. }
            | PoolEvent::SeedInvalidated { timestamp, .. }
            | PoolEvent::ValidationPassCompleted { timestamp, .. } => *timestamp,
        }
    }
}
