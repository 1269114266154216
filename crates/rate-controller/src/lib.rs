//! Adaptive AIMD parallelism control for the Dataverse connection pool.
//!
//! [`RateController`] tracks a pool-wide `current_parallelism` value between a
//! floor (never below the server's per-connection hint) and a ceiling derived
//! from five cumulative caps: a hard cap, an initial warm-up cap, a
//! throttle-derived cap, a request-rate-derived cap and an execution-time
//! derived cap. Sustained successful batches additively increase
//! `current_parallelism`; a protection-limit throttle multiplicatively
//! decreases it. See [`RateControllerConfig`] for the tunable factors and
//! [`RateStatistics`] for introspection.

mod config;
mod controller;
mod statistics;

pub use config::{Preset, RateControllerConfig, RateControllerConfigBuilder};
pub use controller::RateController;
pub use statistics::RateStatistics;
