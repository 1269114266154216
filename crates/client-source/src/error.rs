use std::fmt;

use pool_core::redact;
use thiserror::Error;

/// Broad classification of a seed-creation failure, driving log severity and
/// user-facing hints the way the pool's own error taxonomy does for
/// connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedErrorKind {
    AuthFailed,
    NetworkError,
    ServiceError,
    NotReady,
    Unknown,
}

impl fmt::Display for SeedErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SeedErrorKind::AuthFailed => "auth failed",
            SeedErrorKind::NetworkError => "network error",
            SeedErrorKind::ServiceError => "service error",
            SeedErrorKind::NotReady => "not ready",
            SeedErrorKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// A failure to produce or refresh a seed handle. The message is redacted of
/// credentials at construction time, before it can reach a log line or get
/// attached to a [`pool_core::PoolError::ConnectionFailed`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SeedError {
    kind: SeedErrorKind,
    message: String,
}

impl SeedError {
    pub fn new(kind: SeedErrorKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: redact(message.as_ref()),
        }
    }

    /// The source reported "not ready" for longer than the not-ready wait
    /// budget allows.
    pub fn not_ready() -> Self {
        Self::new(SeedErrorKind::NotReady, "handle did not become ready in time")
    }

    /// Emitted by [`crate::PreAuthenticatedHandleSource`] once invalidation
    /// has been attempted against it: an externally-owned handle cannot be
    /// recreated, so the pool must be told plainly rather than retry forever.
    pub fn seed_cannot_be_recreated() -> Self {
        Self::new(
            SeedErrorKind::Unknown,
            "seed was invalidated but this source wraps an externally-owned handle and cannot recreate it",
        )
    }

    pub fn kind(&self) -> SeedErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

