//! Per-source throttle expiry tracking.
//!
//! Purely in-memory bookkeeping: records when a source was told to back off
//! and for how long, and answers "is source X throttled right now" without
//! ever blocking a reader on a writer. Mirrors the `Arc<Mutex<HashMap<..>>>`
//! shape this workspace already uses for its rate-limiter window state, since
//! the access pattern here (many short reads, occasional writes, no ordering
//! requirement across keys) is identical.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pool_core::SourceName;

#[cfg(feature = "tracing")]
use tracing::debug;

/// A single source's recorded throttle window.
#[derive(Debug, Clone, Copy)]
struct ThrottleEntry {
    throttled_at: Instant,
    expires_at: Instant,
    retry_after: Duration,
}

/// Process-wide totals, independent of any single source's current state.
#[derive(Debug, Default)]
struct Totals {
    throttle_count: u64,
    total_backoff: Duration,
}

/// Thread-safe per-source throttle tracker. Cheap to clone: clones share the
/// same backing map via `Arc`.
#[derive(Clone)]
pub struct ThrottleTracker {
    inner: std::sync::Arc<Inner>,
}

struct Inner {
    entries: Mutex<HashMap<SourceName, ThrottleEntry>>,
    totals: Mutex<Totals>,
}

impl Default for ThrottleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleTracker {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                totals: Mutex::new(Totals::default()),
            }),
        }
    }

    /// Records (or overwrites) a throttle window for `source`.
    pub fn record_throttle(&self, source: &SourceName, retry_after: Duration) {
        let now = Instant::now();
        let entry = ThrottleEntry {
            throttled_at: now,
            expires_at: now + retry_after,
            retry_after,
        };
        self.inner
            .entries
            .lock()
            .expect("throttle tracker mutex poisoned")
            .insert(source.clone(), entry);

        let mut totals = self.inner.totals.lock().expect("throttle tracker mutex poisoned");
        totals.throttle_count += 1;
        totals.total_backoff += retry_after;

        #[cfg(feature = "tracing")]
        debug!(source = %source, retry_after = ?retry_after, "throttle recorded");
        #[cfg(feature = "metrics")]
        metrics::counter!("throttle_tracker_events_total").increment(1);
    }

    /// True iff `source` has a live (unexpired) throttle entry. Opportunistically
    /// purges the entry if it has expired.
    pub fn is_throttled(&self, source: &SourceName) -> bool {
        self.get_throttle_expiry(source).is_some()
    }

    /// The remaining throttle expiry for `source`, if any. Purges on read if expired.
    pub fn get_throttle_expiry(&self, source: &SourceName) -> Option<Instant> {
        let mut entries = self.inner.entries.lock().expect("throttle tracker mutex poisoned");
        match entries.get(source) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.expires_at),
            Some(_) => {
                entries.remove(source);
                None
            }
            None => None,
        }
    }

    pub fn clear_throttle(&self, source: &SourceName) {
        self.inner
            .entries
            .lock()
            .expect("throttle tracker mutex poisoned")
            .remove(source);
    }

    /// Minimum positive `(expires_at - now)` across all live entries, purging
    /// any expired entries it encounters. `Duration::ZERO` if none are throttled.
    pub fn shortest_expiry(&self) -> Duration {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().expect("throttle tracker mutex poisoned");
        entries.retain(|_, entry| now < entry.expires_at);
        entries
            .values()
            .map(|entry| entry.expires_at.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::ZERO)
    }

    /// The set of currently-throttled source names.
    pub fn throttled_connections(&self) -> Vec<SourceName> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().expect("throttle tracker mutex poisoned");
        entries.retain(|_, entry| now < entry.expires_at);
        entries.keys().cloned().collect()
    }

    pub fn throttled_connection_count(&self) -> usize {
        self.throttled_connections().len()
    }

    /// Snapshot of lifetime totals (never purged).
    pub fn total_throttle_events(&self) -> u64 {
        self.inner.totals.lock().expect("throttle tracker mutex poisoned").throttle_count
    }

    pub fn total_backoff_accumulated(&self) -> Duration {
        self.inner.totals.lock().expect("throttle tracker mutex poisoned").total_backoff
    }

    /// Original throttle-after duration for this retry, if still live. Used by
    /// the retry-after parsing property test and by callers wanting to log the
    /// originally-requested wait rather than the remaining one.
    pub fn get_retry_after(&self, source: &SourceName) -> Option<Duration> {
        let mut entries = self.inner.entries.lock().expect("throttle tracker mutex poisoned");
        match entries.get(source) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.retry_after),
            Some(_) => {
                entries.remove(source);
                None
            }
            None => None,
        }
    }
}
