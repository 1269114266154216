//! Maps remote fault shapes to throttle / auth / passthrough classifications.
//!
//! The detector is synchronous and does not itself retry; it only classifies.
//! Retry policy lives in the connection pool. Modeled on this workspace's
//! circuit-breaker `FailureClassifier<Res, Err>` trait: a small classification
//! trait with a default table-driven implementation and a closure-backed
//! escape hatch for callers whose fault shape differs from [`RemoteFault`].

use std::fmt;
use std::time::Duration;

use pool_core::RetryAfter;

/// The three numeric protection-limit codes the remote service is known to use.
/// Recognized bit-exact, per the base specification.
pub mod protection_limit_codes {
    pub const REQUESTS_EXCEEDED: i32 = 429001;
    pub const EXECUTION_TIME_EXCEEDED: i32 = 429002;
    pub const CONCURRENT_REQUESTS_EXCEEDED: i32 = 429003;

    pub const ALL: [i32; 3] = [
        REQUESTS_EXCEEDED,
        EXECUTION_TIME_EXCEEDED,
        CONCURRENT_REQUESTS_EXCEEDED,
    ];
}

/// A small structural description of a remote fault, independent of the
/// embedder's transport. Callers whose fault type does not look like this
/// should implement [`FaultClassifier`] directly or use [`FnFaultClassifier`].
#[derive(Debug, Clone, Default)]
pub struct RemoteFault {
    pub numeric_code: Option<i32>,
    pub http_status: Option<u16>,
    pub message: String,
    pub retry_after: Option<RetryAfterValue>,
}

/// The three accepted shapes for a `Retry-After` value.
#[derive(Debug, Clone, Copy)]
pub enum RetryAfterValue {
    Duration(Duration),
    IntegerSeconds(i64),
    FloatSeconds(f64),
}

impl RetryAfterValue {
    pub fn resolve(self) -> RetryAfter {
        match self {
            RetryAfterValue::Duration(d) => RetryAfter::from_duration(d),
            RetryAfterValue::IntegerSeconds(s) => RetryAfter::from_seconds(s.max(0) as u64),
            RetryAfterValue::FloatSeconds(s) => RetryAfter::from_fractional_seconds(s),
        }
    }
}

/// Classification outcome for a fault.
#[derive(Debug, Clone)]
pub enum FaultClass {
    /// A protection-limit fault. The pool records `retry_after` into the
    /// throttle tracker and retries rather than surfacing this to the caller.
    Throttle { retry_after: Duration },
    /// A security-context failure. `requires_reauthentication` distinguishes
    /// a token failure (`true`) from a plain permission failure (`false`).
    Auth { requires_reauthentication: bool },
    /// Anything else: rethrown unchanged by the pool.
    Passthrough,
}

/// Classifies a fault of type `F`.
pub trait FaultClassifier<F>: Send + Sync {
    fn classify(&self, fault: &F) -> FaultClass;
}

/// The table-driven classifier described by the base specification's fault
/// shape table, operating over [`RemoteFault`].
#[derive(Debug, Clone, Default)]
pub struct DefaultFaultClassifier;

const TOKEN_FAILURE_MARKERS: [&str; 3] = ["aadsts", "token", "credential"];

impl FaultClassifier<RemoteFault> for DefaultFaultClassifier {
    fn classify(&self, fault: &RemoteFault) -> FaultClass {
        if let Some(code) = fault.numeric_code {
            if protection_limit_codes::ALL.contains(&code) {
                let retry_after = fault
                    .retry_after
                    .map(RetryAfterValue::resolve)
                    .unwrap_or_else(RetryAfter::default_value);
                return FaultClass::Throttle {
                    retry_after: retry_after.get(),
                };
            }
        }

        let lower_message = fault.message.to_ascii_lowercase();
        let looks_like_token_failure = fault.http_status == Some(401)
            || TOKEN_FAILURE_MARKERS
                .iter()
                .any(|marker| lower_message.contains(marker));
        if looks_like_token_failure {
            return FaultClass::Auth {
                requires_reauthentication: true,
            };
        }

        if fault.http_status == Some(403) {
            return FaultClass::Auth {
                requires_reauthentication: false,
            };
        }

        FaultClass::Passthrough
    }
}

/// Closure-backed [`FaultClassifier`] for fault types other than [`RemoteFault`].
pub struct FnFaultClassifier<F> {
    classify: std::sync::Arc<dyn Fn(&F) -> FaultClass + Send + Sync>,
}

impl<F> FnFaultClassifier<F> {
    pub fn new(classify: impl Fn(&F) -> FaultClass + Send + Sync + 'static) -> Self {
        Self {
            classify: std::sync::Arc::new(classify),
        }
    }
}

impl<F> FaultClassifier<F> for FnFaultClassifier<F> {
    fn classify(&self, fault: &F) -> FaultClass {
        (self.classify)(fault)
    }
}

impl<F> Clone for FnFaultClassifier<F> {
    fn clone(&self) -> Self {
        Self {
            classify: std::sync::Arc::clone(&self.classify),
        }
    }
}

impl<F> fmt::Debug for FnFaultClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFaultClassifier").field("classify", &"<closure>").finish()
    }
}
