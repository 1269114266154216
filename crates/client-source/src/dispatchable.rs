use futures::future::BoxFuture;

/// The single interface pooled and seed handles implement. A `Handle` is
/// whatever the embedder's SDK client type is; the pool only ever talks to it
/// through this trait.
pub trait Dispatchable: Send + Sync + 'static {
    type Request: Send;
    type Response: Send;
    type Fault: Send;

    /// Dispatches one request. Implementations wrap the embedder's own
    /// fallible call; the throttle/auth detector (`throttle-detector`) is
    /// layered around this by the connection pool, not by the handle itself.
    fn execute<'a>(&'a self, request: Self::Request) -> BoxFuture<'a, Result<Self::Response, Self::Fault>>;

    /// Whether the handle is currently usable. Checked briefly after seed
    /// creation and, when `ValidateOnCheckout` is set, before a pooled handle
    /// is handed to a caller.
    fn is_ready(&self) -> bool;

    /// The server-hinted degree of parallelism for this handle's source, if
    /// the handle is able to report one (e.g. read from a throttling header
    /// on its first successful call).
    fn recommended_dop(&self) -> Option<usize>;

    /// Produces a fresh handle sharing this one's authentication state. The
    /// connection pool calls this on a source's cached seed to populate its
    /// per-source queue; unlike `execute`, this talks to the server and is
    /// refused while the source is throttled.
    fn clone_handle(&self) -> BoxFuture<'_, Result<Self, Self::Fault>>
    where
        Self: Sized;

    /// Applied once, right after construction, to a handle the pool just
    /// created via `clone_handle` when `DisableAffinityCookie` is set. Asks
    /// the handle to drop any load-balancer stickiness cookie from its
    /// session state so the next dispatch isn't pinned to whichever backend
    /// issued it. Handles that carry no such cookie can leave this as a
    /// no-op, which is the default.
    fn disable_affinity_cookie(&self) {}
}
