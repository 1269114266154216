//! Throttle-aware pooling of cloneable client handles across named sources.
//!
//! [`Pool`] owns a fixed set of [`ClientSource`](client_source::ClientSource)s,
//! admits callers through a single semaphore sized to the sources' combined
//! recommended parallelism, and routes each checkout away from sources the
//! [`throttle_tracker`] crate currently considers throttled. [`Pool::execute`]
//! layers a retry loop on top of checkout that consults an injected
//! [`throttle_detector::FaultClassifier`] to decide whether a dispatch fault
//! should be retried silently, surfaced as a typed auth error, or passed
//! through unchanged.

mod config;
mod events;
mod handle;
mod pool;
mod strategy;

pub use config::{PoolConfig, PoolConfigBuilder, PoolConfigData};
pub use events::PoolEvent;
pub use handle::PooledHandle;
pub use pool::{OperationError, Pool, PoolStatistics, SourceStatistics};
pub use strategy::{LeastConnections, RoundRobin, SelectionStrategy, SourceSnapshot, ThrottleAware};
