//! Core infrastructure shared by the Dataverse connection pool crates.
//!
//! This crate provides shared functionality used across the throttle tracker,
//! client source, throttle/auth detector, rate controller, and connection pool:
//! - An event system for observability (listeners over typed event enums)
//! - The pool-wide typed error (`PoolError<E>`)
//! - Cheap shared identifiers (`SourceName`, `ConnectionId`, `RetryAfter`)
//! - Secret redaction applied before any message is logged or surfaced

pub mod error;
pub mod events;
pub mod ids;
pub mod redact;

pub use error::PoolError;
pub use events::{BoxedEventListener, EventListener, EventListeners, FnListener, PoolEvent};
pub use ids::{ConnectionId, RetryAfter, SourceName};
pub use redact::redact;
