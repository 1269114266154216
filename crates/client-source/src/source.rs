use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use pool_core::SourceName;
use tokio::sync::Mutex as AsyncMutex;

use crate::backoff;
use crate::dispatchable::Dispatchable;
use crate::error::{SeedError, SeedErrorKind};

/// A named authentication/identity supplying a pool of cloneable client
/// handles. One seed handle is cached per source.
pub trait ClientSource: Send + Sync + 'static {
    type Handle: Dispatchable;

    fn name(&self) -> &SourceName;
    fn max_pool_size(&self) -> usize;

    /// Returns the cached seed, authenticating it first if necessary. Calls
    /// made while a creation attempt is already in flight coalesce onto that
    /// attempt rather than starting their own.
    fn get_seed_client(&self) -> BoxFuture<'_, Result<Arc<Self::Handle>, SeedError>>;

    /// Discards the cached seed so the next `get_seed_client` re-authenticates.
    fn invalidate_seed(&self) -> BoxFuture<'_, ()>;

    /// Releases any cached seed. Sources with nothing to release can accept
    /// the default no-op.
    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

async fn create_with_retry<H, F>(factory: &F) -> Result<H, SeedError>
where
    H: Dispatchable,
    F: Fn() -> BoxFuture<'static, Result<H, SeedError>> + Send + Sync,
{
    let mut last_err = None;
    for attempt in 0..backoff::SEED_CREATION_ATTEMPTS {
        match factory().await {
            Ok(handle) => {
                wait_for_ready(&handle).await?;
                return Ok(handle);
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt, error = %err, "seed creation attempt failed");
                last_err = Some(err);
                if let Some(delay) = backoff::delay_after_attempt(attempt) {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        SeedError::new(SeedErrorKind::Unknown, "seed creation failed with no error detail")
    }))
}

async fn wait_for_ready<H: Dispatchable>(handle: &H) -> Result<(), SeedError> {
    if handle.is_ready() {
        return Ok(());
    }
    let deadline = tokio::time::Instant::now() + backoff::NOT_READY_BUDGET;
    loop {
        tokio::time::sleep(backoff::NOT_READY_POLL_INTERVAL).await;
        if handle.is_ready() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SeedError::not_ready());
        }
    }
}

/// A source that owns credentials and builds a fresh handle from scratch on
/// every authentication, via a caller-supplied async factory.
///
/// The factory models whatever SDK call actually performs authentication;
/// this crate has no opinion on OAuth/secret/certificate mechanics (those are
/// explicitly out of scope — see the crate's seed-and-clone abstraction).
pub struct ConnectionStringSource<H, F>
where
    H: Dispatchable,
    F: Fn() -> BoxFuture<'static, Result<H, SeedError>> + Send + Sync + 'static,
{
    name: SourceName,
    max_pool_size: usize,
    factory: F,
    cache: AsyncMutex<Option<Arc<H>>>,
}

impl<H, F> ConnectionStringSource<H, F>
where
    H: Dispatchable,
    F: Fn() -> BoxFuture<'static, Result<H, SeedError>> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<SourceName>, max_pool_size: usize, factory: F) -> Self {
        Self {
            name: name.into(),
            max_pool_size,
            factory,
            cache: AsyncMutex::new(None),
        }
    }
}

impl<H, F> ClientSource for ConnectionStringSource<H, F>
where
    H: Dispatchable,
    F: Fn() -> BoxFuture<'static, Result<H, SeedError>> + Send + Sync + 'static,
{
    type Handle = H;

    fn name(&self) -> &SourceName {
        &self.name
    }

    fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    fn get_seed_client(&self) -> BoxFuture<'_, Result<Arc<H>, SeedError>> {
        Box::pin(async move {
            let mut guard = self.cache.lock().await;
            if let Some(handle) = guard.as_ref() {
                return Ok(Arc::clone(handle));
            }
            let handle = Arc::new(create_with_retry(&self.factory).await?);
            *guard = Some(Arc::clone(&handle));
            Ok(handle)
        })
    }

    fn invalidate_seed(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.cache.lock().await;
            *guard = None;
        })
    }

    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.cache.lock().await;
            *guard = None;
        })
    }
}

/// A source wrapping a handle constructed and owned by the embedding
/// application. Invalidation cannot recreate it; once attempted, subsequent
/// `get_seed_client` calls fail so the pool can surface a typed condition
/// rather than keep handing out a handle the caller has disowned.
pub struct PreAuthenticatedHandleSource<H: Dispatchable> {
    name: SourceName,
    max_pool_size: usize,
    handle: Arc<H>,
    invalidated: AtomicBool,
}

impl<H: Dispatchable> PreAuthenticatedHandleSource<H> {
    pub fn new(name: impl Into<SourceName>, max_pool_size: usize, handle: H) -> Self {
        Self {
            name: name.into(),
            max_pool_size,
            handle: Arc::new(handle),
            invalidated: AtomicBool::new(false),
        }
    }
}

impl<H: Dispatchable> ClientSource for PreAuthenticatedHandleSource<H> {
    type Handle = H;

    fn name(&self) -> &SourceName {
        &self.name
    }

    fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    fn get_seed_client(&self) -> BoxFuture<'_, Result<Arc<H>, SeedError>> {
        Box::pin(async move {
            if self.invalidated.load(Ordering::Acquire) {
                return Err(SeedError::seed_cannot_be_recreated());
            }
            Ok(Arc::clone(&self.handle))
        })
    }

    fn invalidate_seed(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.invalidated.store(true, Ordering::Release);
        })
    }
}
