//! Core resource pool implementation

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::PoolConfig;
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::eviction::Entry;
use crate::idle::IdleQueue;
use crate::metrics::{MetricsTracker, PoolMetrics, PoolStatus};

/// A handle the pool knows how to shut.
///
/// `close` is called exactly once per handle, always with the pool's
/// internal lock released.
pub trait Closable: Send + 'static {
    fn close(&mut self) -> Result<(), BoxError>;
}

/// Future returned by an opener.
pub type OpenFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

type Opener<T> = Box<dyn Fn(CancellationToken) -> OpenFuture<T> + Send + Sync>;
type UsableFn<T> = Box<dyn Fn(&CancellationToken, &T) -> bool + Send + Sync>;

/// A resource borrowed from a [`Pool`].
///
/// Dereferences to the underlying handle. Give it back with [`Pool::put`]
/// or [`Pool::discard`]; a resource dropped without either is closed and
/// its capacity reclaimed, so the pool never leaks its counter.
pub struct PooledResource<T: Closable> {
    entry: Option<Entry<T>>,
    shared: Arc<Shared<T>>,
}

impl<T: Closable> fmt::Debug for PooledResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("id", &self.entry.as_ref().map(|e| e.id))
            .finish()
    }
}

impl<T: Closable> PooledResource<T> {
    /// When the opener produced this handle.
    pub fn opened_at(&self) -> Instant {
        self.entry().opened_at
    }

    fn entry(&self) -> &Entry<T> {
        self.entry.as_ref().expect("resource already returned")
    }
}

impl<T: Closable> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.entry().handle
    }
}

impl<T: Closable> DerefMut for PooledResource<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry.as_mut().expect("resource already returned").handle
    }
}

impl<T: Closable> Drop for PooledResource<T> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            self.shared.busy.remove(&entry.id);
            debug!(id = entry.id, "resource dropped without put or discard");
            self.shared
                .metrics
                .total_discarded
                .fetch_add(1, Ordering::Relaxed);
            if let Err(err) = entry.handle.close() {
                warn!(id = entry.id, error = %err, "close failed for dropped resource");
            }
            if let Err(err) = self.shared.decrease() {
                error!(error = %err, "counter inconsistency after dropped resource");
            }
            self.shared.available.notify_one();
        }
    }
}

/// Capacity counter and the shutdown flag, the only state under the mutex.
struct PoolInner {
    opened: usize,
    closed: bool,
}

struct Shared<T: Closable> {
    opener: Opener<T>,
    usable: Option<UsableFn<T>>,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    /// Handles currently borrowed by callers, keyed by handle identity.
    busy: DashMap<u64, ()>,
    idle: IdleQueue<T>,
    /// One wakeup per availability-increasing event. A stored permit covers
    /// the no-waiter case; woken waiters re-run the acquisition phases.
    available: Notify,
    /// Signalled when `opened` reaches zero after shutdown has begun.
    drained: Notify,
    next_id: AtomicU64,
    metrics: MetricsTracker,
}

/// An optimistic capacity reservation taken before the opener runs.
///
/// Dropping it un-committed reverses the increment and wakes one waiter,
/// which also covers a `get` future cancelled mid-open.
struct Reservation<'a, T: Closable> {
    shared: &'a Shared<T>,
    committed: bool,
}

impl<'a, T: Closable> Reservation<'a, T> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl<'a, T: Closable> Drop for Reservation<'a, T> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(err) = self.shared.decrease() {
                error!(error = %err, "counter inconsistency reversing a reservation");
            }
            self.shared.available.notify_one();
        }
    }
}

impl<T: Closable> Shared<T> {
    fn ensure_open(&self) -> PoolResult<()> {
        if self.inner.lock().unwrap().closed {
            return Err(PoolError::PoolClosed);
        }
        Ok(())
    }

    /// Reserve one unit of capacity if the cap allows.
    fn reserve(&self) -> Option<Reservation<'_, T>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed || inner.opened >= self.config.max_open {
            return None;
        }
        inner.opened += 1;
        Some(Reservation {
            shared: self,
            committed: false,
        })
    }

    /// Give one unit of capacity back.
    ///
    /// Fails when the decrement would drop `opened` below the idle length,
    /// which means a duplicate return slipped through.
    fn decrease(&self) -> PoolResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let idle = self.idle.len();
        let next = match inner.opened.checked_sub(1) {
            Some(next) if next >= idle => next,
            _ => {
                return Err(PoolError::Inconsistency {
                    opened: inner.opened,
                    idle,
                })
            }
        };
        inner.opened = next;
        if inner.closed && next == 0 {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Close a handle leaving the pool and give its capacity back.
    ///
    /// The close error is returned so callers with an error channel can
    /// surface it; the capacity is reclaimed either way.
    fn close_entry(&self, mut entry: Entry<T>) -> PoolResult<()> {
        self.metrics.total_discarded.fetch_add(1, Ordering::Relaxed);
        let closed = entry.handle.close().map_err(PoolError::CloseFailed);
        self.decrease()?;
        self.available.notify_one();
        closed
    }

    /// Close a handle rejected by an acquire-time check. No caller is
    /// waiting for the outcome, so close errors are logged and swallowed.
    fn evict(&self, mut entry: Entry<T>, reason: &str) {
        debug!(id = entry.id, reason, "evicting resource");
        self.metrics.total_evicted.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = entry.handle.close() {
            warn!(id = entry.id, error = %err, "close failed during eviction");
        }
        if let Err(err) = self.decrease() {
            error!(error = %err, "counter inconsistency during eviction");
        }
        self.available.notify_one();
    }
}

/// Thread-safe pool of closable handles.
///
/// Bounds total live handles by `max_open`, caches up to `max_idle`
/// returned handles for reuse, and lazily evicts cached handles that
/// outlive the configured staleness bounds.
///
/// # Examples
///
/// ```
/// use respool::{BoxError, Closable, Pool, PoolConfig};
/// use tokio_util::sync::CancellationToken;
///
/// struct Conn;
///
/// impl Closable for Conn {
///     fn close(&mut self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), respool::PoolError> {
/// let pool = Pool::new(
///     |_ctx| async { Ok::<_, BoxError>(Conn) },
///     PoolConfig::default(),
/// )?;
///
/// let ctx = CancellationToken::new();
/// let conn = pool.get(&ctx).await?;
/// pool.put(conn)?;
/// # Ok(())
/// # }
/// ```
pub struct Pool<T: Closable> {
    shared: Arc<Shared<T>>,
}

impl<T: Closable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Closable> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

impl<T: Closable> Pool<T> {
    /// Create a pool around an opener.
    ///
    /// The opener receives a clone of the acquiring caller's cancellation
    /// token and either produces a fresh handle or fails; the failure is
    /// surfaced verbatim from [`Pool::get`].
    pub fn new<F, Fut>(opener: F, config: PoolConfig) -> PoolResult<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::build(box_opener(opener), None, config)
    }

    /// Create a pool that also screens idle handles through `usable`
    /// before handing them out; rejected handles are closed and replaced.
    pub fn with_usable<F, Fut, U>(opener: F, usable: U, config: PoolConfig) -> PoolResult<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        U: Fn(&CancellationToken, &T) -> bool + Send + Sync + 'static,
    {
        Self::build(box_opener(opener), Some(Box::new(usable)), config)
    }

    /// Create a pool from a string key/value option map, as accepted by
    /// [`PoolConfig::from_map`].
    pub fn from_map<F, Fut>(opener: F, options: &HashMap<String, String>) -> PoolResult<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        Self::new(opener, PoolConfig::from_map(options)?)
    }

    fn build(
        opener: Opener<T>,
        usable: Option<UsableFn<T>>,
        config: PoolConfig,
    ) -> PoolResult<Self> {
        config.validate()?;
        let config = config.clamped();
        debug!(
            max_open = config.max_open,
            max_idle = config.max_idle,
            "created resource pool"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                opener,
                usable,
                idle: IdleQueue::new(config.max_idle),
                config,
                inner: Mutex::new(PoolInner {
                    opened: 0,
                    closed: false,
                }),
                busy: DashMap::new(),
                available: Notify::new(),
                drained: Notify::new(),
                next_id: AtomicU64::new(0),
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Borrow a handle from the pool.
    ///
    /// Serves from the idle buffer when possible, opens a fresh handle
    /// while under the `max_open` cap, and otherwise blocks until a
    /// returning caller frees something up. Cancelling `ctx` fails the
    /// blocked wait with [`PoolError::AcquireTimeout`]; a token that is
    /// already cancelled on entry still gets the two non-blocking
    /// attempts.
    pub async fn get(&self, ctx: &CancellationToken) -> PoolResult<PooledResource<T>> {
        loop {
            self.shared.ensure_open()?;

            if let Some(entry) = self.take_idle(ctx) {
                return Ok(self.lease(entry, true));
            }

            if let Some(reservation) = self.shared.reserve() {
                return self.open_fresh(ctx, reservation).await;
            }

            // Saturated: park until a return, a discard, or a reversed
            // reservation frees something, then retry from the top.
            let available = self.shared.available.notified();
            tokio::pin!(available);
            available.as_mut().enable();
            if self.shared.inner.lock().unwrap().closed {
                return Err(PoolError::PoolClosed);
            }
            tokio::select! {
                _ = &mut available => {}
                _ = ctx.cancelled() => return Err(PoolError::AcquireTimeout),
            }
        }
    }

    /// Non-blocking variant of [`Pool::get`]: serves from the idle buffer
    /// or opens a fresh handle, but returns `Ok(None)` instead of waiting
    /// when the pool is saturated.
    pub async fn try_get(&self, ctx: &CancellationToken) -> PoolResult<Option<PooledResource<T>>> {
        self.shared.ensure_open()?;

        if let Some(entry) = self.take_idle(ctx) {
            return Ok(Some(self.lease(entry, true)));
        }

        match self.shared.reserve() {
            Some(reservation) => self.open_fresh(ctx, reservation).await.map(Some),
            None => Ok(None),
        }
    }

    /// Return a borrowed handle for reuse.
    ///
    /// A handle that outlived `max_life_time`, or that finds the idle
    /// buffer full, is closed instead of cached. Returning into a pool
    /// that has begun shutting down closes the handle but still reports
    /// success. Fails with [`PoolError::ForeignResource`] when the
    /// resource was not borrowed from this pool.
    pub fn put(&self, resource: PooledResource<T>) -> PoolResult<()> {
        let mut entry = self.reclaim(resource)?;

        if entry.exceeds_max_life_time(&self.shared.config) {
            debug!(id = entry.id, "returned resource outlived max life time");
            return self.close_returned(entry);
        }

        entry.touch();
        let overflow = {
            // The push must not race the shutdown drain, so the closed
            // check and the enqueue sit under the same lock. The push
            // itself never blocks.
            let inner = self.shared.inner.lock().unwrap();
            if inner.closed {
                drop(inner);
                return self.close_returned(entry);
            }
            self.shared.idle.try_push(entry).err()
        };

        match overflow {
            None => {
                self.shared.available.notify_one();
                Ok(())
            }
            Some(entry) => self.close_returned(entry),
        }
    }

    /// Close a handle on its way back from a caller. The close error is
    /// the caller's to see, except when the pool has begun shutting down:
    /// a return into a draining pool must not fail, whichever sub-path
    /// ends up closing the handle, so those errors are logged instead.
    fn close_returned(&self, entry: Entry<T>) -> PoolResult<()> {
        match self.shared.close_entry(entry) {
            Err(PoolError::CloseFailed(err)) => {
                if self.shared.inner.lock().unwrap().closed {
                    warn!(error = %err, "close failed while returning into shutdown");
                    Ok(())
                } else {
                    Err(PoolError::CloseFailed(err))
                }
            }
            other => other,
        }
    }

    /// Close a borrowed handle instead of returning it for reuse.
    ///
    /// The handle's close error, if any, is surfaced; the capacity is
    /// reclaimed either way. Fails with [`PoolError::ForeignResource`]
    /// when the resource was not borrowed from this pool.
    pub fn discard(&self, resource: PooledResource<T>) -> PoolResult<()> {
        let entry = self.reclaim(resource)?;
        debug!(id = entry.id, "discarding resource");
        self.shared.close_entry(entry)
    }

    /// Shut the pool down.
    ///
    /// Refuses further acquisition (parked waiters fail with
    /// [`PoolError::PoolClosed`]), closes every idle handle, then waits
    /// for outstanding borrowed handles to come back through
    /// [`Pool::put`], [`Pool::discard`] or drops. Calling it again is
    /// harmless and waits for the same drain.
    pub async fn shutdown(&self) -> PoolResult<()> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            if !inner.closed {
                inner.closed = true;
                debug!("pool shutting down");
            }
        }
        self.shared.available.notify_waiters();

        while let Some(entry) = self.shared.idle.try_pop() {
            let id = entry.id;
            if let Err(err) = self.shared.close_entry(entry) {
                match err {
                    PoolError::CloseFailed(err) => {
                        warn!(id, error = %err, "close failed during shutdown drain");
                    }
                    err => return Err(err),
                }
            }
        }

        loop {
            let drained = self.shared.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.shared.inner.lock().unwrap().opened == 0 {
                break;
            }
            drained.await;
        }
        debug!("pool shut down");
        Ok(())
    }

    /// Current count of live handles. See [`PoolStatus`] for the
    /// atomicity caveat shared by all inspection reads.
    pub fn opened(&self) -> usize {
        self.shared.inner.lock().unwrap().opened
    }

    /// Current count of handles borrowed by callers.
    pub fn busy_count(&self) -> usize {
        self.shared.busy.len()
    }

    /// Current count of handles cached for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.len()
    }

    /// Population snapshot; the fields are sampled independently.
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            opened: self.opened(),
            busy: self.busy_count(),
            idle: self.idle_count(),
        }
    }

    /// Cumulative counters since construction.
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics.snapshot()
    }

    /// Phase 1: drain the idle buffer until a handle passes the staleness
    /// and usability checks. Rejected handles are closed on the spot.
    fn take_idle(&self, ctx: &CancellationToken) -> Option<Entry<T>> {
        while let Some(entry) = self.shared.idle.try_pop() {
            if entry.exceeds_max_idle_time(&self.shared.config) {
                self.shared.evict(entry, "exceeded max idle time");
                continue;
            }
            if entry.exceeds_max_life_time(&self.shared.config) {
                self.shared.evict(entry, "exceeded max life time");
                continue;
            }
            if let Some(usable) = &self.shared.usable {
                if !usable(ctx, &entry.handle) {
                    self.shared.evict(entry, "failed usability check");
                    continue;
                }
            }
            return Some(entry);
        }
        None
    }

    /// Phase 2: run the opener against a held reservation.
    async fn open_fresh(
        &self,
        ctx: &CancellationToken,
        reservation: Reservation<'_, T>,
    ) -> PoolResult<PooledResource<T>> {
        match (self.shared.opener)(ctx.clone()).await {
            Ok(handle) => {
                reservation.commit();
                let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
                self.shared
                    .metrics
                    .total_created
                    .fetch_add(1, Ordering::Relaxed);
                debug!(id, "opened fresh resource");
                Ok(self.lease(Entry::new(handle, id), false))
            }
            // Dropping the reservation reverses the optimistic increment
            // and wakes one waiter.
            Err(err) => Err(PoolError::Opener(err)),
        }
    }

    fn lease(&self, entry: Entry<T>, recycled: bool) -> PooledResource<T> {
        self.shared.busy.insert(entry.id, ());
        self.shared
            .metrics
            .total_acquired
            .fetch_add(1, Ordering::Relaxed);
        if recycled {
            self.shared
                .metrics
                .total_recycled
                .fetch_add(1, Ordering::Relaxed);
        }
        PooledResource {
            entry: Some(entry),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take the entry back from a caller, verifying the resource really is
    /// one of ours and currently borrowed.
    fn reclaim(&self, mut resource: PooledResource<T>) -> PoolResult<Entry<T>> {
        if !Arc::ptr_eq(&self.shared, &resource.shared) {
            // Dropping the wrapper routes the handle back to the pool
            // that actually owns it.
            return Err(PoolError::ForeignResource);
        }
        let entry = match resource.entry.take() {
            Some(entry) => entry,
            None => return Err(PoolError::ForeignResource),
        };
        if self.shared.busy.remove(&entry.id).is_none() {
            resource.entry = Some(entry);
            return Err(PoolError::ForeignResource);
        }
        Ok(entry)
    }
}

fn box_opener<T, F, Fut>(opener: F) -> Opener<T>
where
    T: Closable,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Box::new(move |ctx| -> OpenFuture<T> { Box::pin(opener(ctx)) })
}
