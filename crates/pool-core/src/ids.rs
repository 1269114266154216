//! Cheap, non-persisted identifiers shared by every pool component.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The name of a source, cheap to clone into map keys and log fields.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SourceName(Arc<str>);

impl SourceName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Process-wide counter backing [`ConnectionId::next`].
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a pooled handle. Never persisted across restarts.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Server-indicated wait duration extracted from a protection-limit fault.
///
/// Accepts the three shapes the remote service is known to send: a duration
/// value, an integer number of seconds, or a floating number of seconds.
/// Absent or unparsable input defaults to 30 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetryAfter(Duration);

impl RetryAfter {
    pub const DEFAULT: Duration = Duration::from_secs(30);

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self(Duration::from_secs(seconds))
    }

    pub fn from_fractional_seconds(seconds: f64) -> Self {
        Self(Duration::from_secs_f64(seconds.max(0.0)))
    }

    pub fn default_value() -> Self {
        Self(Self::DEFAULT)
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

impl From<RetryAfter> for Duration {
    fn from(value: RetryAfter) -> Self {
        value.0
    }
}
