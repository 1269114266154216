use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pool_core::SourceName;

/// A read-only view of one source at selection time.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub name: SourceName,
    pub active: usize,
    pub is_throttled: bool,
    pub throttle_remaining: Duration,
}

/// Picks a source among candidates already filtered to exclude the caller's
/// `exclude_source`, if any.
pub trait SelectionStrategy: Send + Sync {
    fn select(&self, candidates: &[SourceSnapshot]) -> Option<SourceName>;
}

/// Monotonically incrementing index modulo candidate count.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, candidates: &[SourceSnapshot]) -> Option<SourceName> {
        if candidates.is_empty() {
            return None;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[i].name.clone())
    }
}

/// Argmin of active connection count; ties broken by candidate order.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastConnections {
    fn select(&self, candidates: &[SourceSnapshot]) -> Option<SourceName> {
        candidates
            .iter()
            .min_by_key(|candidate| candidate.active)
            .map(|candidate| candidate.name.clone())
    }
}

/// Round-robins among non-throttled sources; if every source is throttled,
/// returns the one with the shortest remaining wait so the caller's
/// subsequent sleep is minimized. The default strategy.
#[derive(Debug, Default)]
pub struct ThrottleAware {
    round_robin_index: AtomicUsize,
}

impl ThrottleAware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for ThrottleAware {
    fn select(&self, candidates: &[SourceSnapshot]) -> Option<SourceName> {
        let available: Vec<&SourceSnapshot> =
            candidates.iter().filter(|candidate| !candidate.is_throttled).collect();

        if !available.is_empty() {
            let i = self.round_robin_index.fetch_add(1, Ordering::Relaxed) % available.len();
            return Some(available[i].name.clone());
        }

        candidates
            .iter()
            .min_by_key(|candidate| candidate.throttle_remaining)
            .map(|candidate| candidate.name.clone())
    }
}
