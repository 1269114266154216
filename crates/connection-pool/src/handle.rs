use std::ops::Deref;
use std::time::Instant;

use client_source::Dispatchable;
use pool_core::{ConnectionId, SourceName};
use tokio::sync::OwnedSemaphorePermit;

use crate::pool::PoolInner;
use std::sync::Arc;

/// A handle living in a source's queue or checked out by a caller, plus the
/// bookkeeping needed to validate and reset it.
pub(crate) struct PooledEntry<H> {
    pub(crate) handle: H,
    pub(crate) connection_id: ConnectionId,
    pub(crate) created_at: Instant,
    pub(crate) last_used_at: Instant,
    pub(crate) is_invalid: bool,
    pub(crate) invalid_reason: Option<String>,
}

impl<H> PooledEntry<H> {
    pub(crate) fn new(handle: H) -> Self {
        let now = Instant::now();
        Self {
            handle,
            connection_id: ConnectionId::next(),
            created_at: now,
            last_used_at: now,
            is_invalid: false,
            invalid_reason: None,
        }
    }

    pub(crate) fn mark_invalid(&mut self, reason: impl Into<String>) {
        self.is_invalid = true;
        self.invalid_reason = Some(reason.into());
    }

    /// Resets to the state snapshot captured at construction, aside from
    /// `created_at`/`connection_id` which persist across checkouts.
    pub(crate) fn reset(&mut self) {
        self.last_used_at = Instant::now();
        self.is_invalid = false;
        self.invalid_reason = None;
    }

    pub(crate) fn is_expired(&self, max_idle_time: std::time::Duration, max_lifetime: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used_at) > max_idle_time
            || now.saturating_duration_since(self.created_at) > max_lifetime
    }
}

/// A checked-out pooled handle. Derefs to the underlying dispatchable client;
/// dropping it (or calling [`PooledHandle::release`]) returns it to the pool
/// exactly once, per the single-release admission contract.
pub struct PooledHandle<H: Dispatchable> {
    entry: Option<PooledEntry<H>>,
    source: SourceName,
    pool: Arc<PoolInner<H>>,
    _permit: OwnedSemaphorePermit,
}

impl<H: Dispatchable> PooledHandle<H> {
    pub(crate) fn new(
        entry: PooledEntry<H>,
        source: SourceName,
        pool: Arc<PoolInner<H>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            entry: Some(entry),
            source,
            pool,
            _permit: permit,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.entry.as_ref().expect("entry present until drop").connection_id
    }

    pub fn source_name(&self) -> &SourceName {
        &self.source
    }

    /// Marks the handle invalid so it is disposed rather than re-enqueued
    /// when it is returned.
    pub fn mark_invalid(&mut self, reason: impl Into<String>) {
        if let Some(entry) = self.entry.as_mut() {
            entry.mark_invalid(reason);
        }
    }

    /// Explicitly returns the handle to the pool. Equivalent to dropping it,
    /// provided as an async entry point for callers who want to await the
    /// return rather than rely on a synchronous drop.
    pub async fn release(self) {
        drop(self);
    }
}

impl<H: Dispatchable> Deref for PooledHandle<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.entry.as_ref().expect("entry present until drop").handle
    }
}

impl<H: Dispatchable> Drop for PooledHandle<H> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.finish_checkout(&self.source, entry);
        }
    }
}
