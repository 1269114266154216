//! The pool-wide typed error.
//!
//! `PoolError<E>` is the single error type surfaced from `Execute`/`GetClient`.
//! `E` is the embedder's own application fault type (the error the underlying
//! dispatch returns on a non-throttle, non-auth failure) so callers get one
//! error type to match on instead of a `Box<dyn Error>` grab bag.

use std::time::Duration;

use thiserror::Error;

use crate::ids::SourceName;

/// Errors surfaced from the pool's public operations.
#[derive(Debug, Clone, Error)]
pub enum PoolError<E> {
    /// The admission semaphore did not grant a permit within `timeout`.
    #[error("pool exhausted: {active}/{capacity} connections active, timed out after {timeout:?}")]
    PoolExhausted {
        active: usize,
        capacity: usize,
        timeout: Duration,
    },
    /// `MaxRetryAfterTolerance` was exceeded while waiting for a source to clear.
    #[error("service protection: waited {waited:?}, exceeding tolerance of {tolerance:?}")]
    ServiceProtection { waited: Duration, tolerance: Duration },
    /// Seed creation or clone failed for a non-authentication reason.
    #[error("connection to source '{source}' failed: {reason}")]
    ConnectionFailed { source: SourceName, reason: String },
    /// A token or permission failure was observed.
    #[error("authentication error (reauthentication required: {requires_reauthentication}): {message}")]
    AuthError {
        requires_reauthentication: bool,
        message: String,
    },
    /// The pool or a source was configured inconsistently.
    #[error("invalid pool configuration: {message}")]
    ConfigurationInvalid { message: String },
    /// The wrapped dispatch returned its own application-level error.
    #[error("{0}")]
    Application(E),
}

impl<E> PoolError<E> {
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, PoolError::PoolExhausted { .. })
    }

    pub fn is_service_protection(&self) -> bool {
        matches!(self, PoolError::ServiceProtection { .. })
    }

    pub fn is_connection_failed(&self) -> bool {
        matches!(self, PoolError::ConnectionFailed { .. })
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, PoolError::AuthError { .. })
    }

    /// `None` for any variant other than `AuthError`.
    pub fn requires_reauthentication(&self) -> Option<bool> {
        match self {
            PoolError::AuthError {
                requires_reauthentication,
                ..
            } => Some(*requires_reauthentication),
            _ => None,
        }
    }

    pub fn is_configuration_invalid(&self) -> bool {
        matches!(self, PoolError::ConfigurationInvalid { .. })
    }

    pub fn is_application(&self) -> bool {
        matches!(self, PoolError::Application(_))
    }

    pub fn application_error(&self) -> Option<&E> {
        match self {
            PoolError::Application(err) => Some(err),
            _ => None,
        }
    }

    pub fn map_application<E2>(self, f: impl FnOnce(E) -> E2) -> PoolError<E2> {
        match self {
            PoolError::PoolExhausted {
                active,
                capacity,
                timeout,
            } => PoolError::PoolExhausted {
                active,
                capacity,
                timeout,
            },
            PoolError::ServiceProtection { waited, tolerance } => {
                PoolError::ServiceProtection { waited, tolerance }
            }
            PoolError::ConnectionFailed { source, reason } => {
                PoolError::ConnectionFailed { source, reason }
            }
            PoolError::AuthError {
                requires_reauthentication,
                message,
            } => PoolError::AuthError {
                requires_reauthentication,
                message,
            },
            PoolError::ConfigurationInvalid { message } => {
                PoolError::ConfigurationInvalid { message }
            }
            PoolError::Application(err) => PoolError::Application(f(err)),
        }
    }
}
