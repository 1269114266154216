//! Throttle-aware connection pooling and adaptive rate control for
//! high-throughput Dataverse clients.
//!
//! `dataverse-pool` re-exports a small stack of crates that each own one
//! layer of the same problem: keeping a fixed set of named sources (Dataverse
//! organizations, typically) supplied with ready client handles, without
//! ever exceeding what each source's own protection limits allow.
//!
//! - **[`pool-core`]** — shared identifiers (`SourceName`, `ConnectionId`,
//!   `RetryAfter`), the typed `PoolError<E>`, the event-listener machinery,
//!   and message redaction.
//! - **[`throttle-tracker`]** — per-source "are we currently told to back
//!   off" bookkeeping.
//! - **[`throttle-detector`]** — classifies a dispatch fault as a throttle,
//!   an auth failure, or something to pass straight through.
//! - **[`rate-controller`]** — the AIMD controller that grows or shrinks
//!   recommended parallelism per source based on observed throttles and
//!   batch timings.
//! - **[`client-source`]** — seed authentication and the seed-and-clone
//!   abstraction ([`Dispatchable`]) pooled handles implement.
//! - **[`connection-pool`]** — [`Pool`], which ties the above together:
//!   admission, source selection, checkout/return, and retrying dispatch.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dataverse_pool::{
//!     ClientSource, ConnectionStringSource, Dispatchable, FaultClass,
//!     FaultClassifier, FnFaultClassifier, Pool, PoolConfig, SeedError,
//!     RateControllerConfig,
//! };
//! use futures::future::BoxFuture;
//!
//! #[derive(Clone)]
//! struct MyClient;
//!
//! #[derive(Debug)]
//! struct MyFault { throttled: bool }
//!
//! impl std::fmt::Display for MyFault {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "fault (throttled: {})", self.throttled)
//!     }
//! }
//! impl std::error::Error for MyFault {}
//!
//! impl Dispatchable for MyClient {
//!     type Request = String;
//!     type Response = String;
//!     type Fault = MyFault;
//!
//!     fn execute(&self, req: String) -> BoxFuture<'_, Result<String, MyFault>> {
//!         Box::pin(async move { Ok(req) })
//!     }
//!
//!     fn is_ready(&self) -> bool { true }
//!     fn recommended_dop(&self) -> Option<usize> { Some(10) }
//!
//!     fn clone_handle(&self) -> BoxFuture<'_, Result<Self, MyFault>> {
//!         Box::pin(async move { Ok(self.clone()) })
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ConnectionStringSource::new("org1", 16, || {
//!     Box::pin(async { Ok(MyClient) }) as BoxFuture<'static, Result<MyClient, SeedError>>
//! });
//!
//! let classifier = Arc::new(FnFaultClassifier::new(|fault: &MyFault| {
//!     if fault.throttled {
//!         FaultClass::Throttle { retry_after: std::time::Duration::from_secs(1) }
//!     } else {
//!         FaultClass::Passthrough
//!     }
//! }));
//!
//! let pool = Pool::new(
//!     vec![Arc::new(source) as Arc<dyn ClientSource<Handle = MyClient>>],
//!     PoolConfig::builder().build(),
//!     RateControllerConfig::builder().build(),
//!     classifier,
//! )
//! .await?;
//!
//! let handle = pool.get_client(None).await?;
//! let _ = handle.execute("hello".to_string()).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Composing Sources
//!
//! Most embedders configure one [`ClientSource`] per Dataverse organization
//! the process talks to, each with its own `max_pool_size` matched to that
//! organization's service-protection limit. [`Pool`] admits callers through
//! a single semaphore sized to the sum of every source's recommended
//! parallelism (or a fixed [`PoolConfig::builder`] override), and routes each
//! checkout away from whichever sources [`ThrottleTracker`] currently
//! considers throttled.

pub use client_source::{ClientSource, ConnectionStringSource, Dispatchable, PreAuthenticatedHandleSource, SeedError, SeedErrorKind};
pub use connection_pool::{
    LeastConnections, OperationError, Pool, PoolConfig, PoolConfigBuilder, PoolConfigData, PoolEvent, PoolStatistics,
    PooledHandle, RoundRobin, SelectionStrategy, SourceSnapshot, SourceStatistics, ThrottleAware,
};
pub use pool_core::{redact, BoxedEventListener, ConnectionId, EventListener, EventListeners, FnListener, PoolError, RetryAfter, SourceName};
pub use rate_controller::{Preset, RateController, RateControllerConfig, RateControllerConfigBuilder, RateStatistics};
pub use throttle_detector::{DefaultFaultClassifier, FaultClass, FaultClassifier, FnFaultClassifier, RemoteFault, RetryAfterValue};
pub use throttle_tracker::ThrottleTracker;
