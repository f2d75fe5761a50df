//! Connection Cache
//!
//! Process-wide map from physical store name to its live handle. At most one
//! handle exists per store; concurrent first access collapses into a single
//! build whose result every waiter shares.
//!
//! # Usage
//!
//! ```rust,ignore
//! let cache = Arc::new(ConnectionCache::new(factory));
//!
//! let handle = cache.get_or_create("tenant_acme").await?;
//! cache.evict("tenant_acme").await;
//!
//! let report = cache.drain_all().await;
//! ```

use crate::error::{TenantError, TenantResult};
use crate::factory::ConnectionFactory;
use crate::handle::ConnectionHandle;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use keystone_log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type SharedHandle<C> = Arc<ConnectionHandle<C>>;
type Flight<C> = Shared<BoxFuture<'static, TenantResult<SharedHandle<C>>>>;

struct CacheState<C> {
    handles: HashMap<String, SharedHandle<C>>,
    in_flight: HashMap<String, Flight<C>>,
    closed: bool,
}

impl<C> Default for CacheState<C> {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
            in_flight: HashMap::new(),
            closed: false,
        }
    }
}

/// Outcome of [`ConnectionCache::drain_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Stores whose handle closed cleanly
    pub closed: Vec<String>,
    /// Stores whose close failed, with the failure
    pub failed: Vec<(String, TenantError)>,
}

impl DrainReport {
    /// Number of handles asked to close.
    pub fn total(&self) -> usize {
        self.closed.len() + self.failed.len()
    }

    /// Whether every close succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lookup-or-create cache of store handles.
///
/// The state lock guards only map operations and is never held across an
/// `.await`. Builds run in their own task, so a caller that gives up while
/// waiting neither aborts the build for others nor leaks the handle.
pub struct ConnectionCache<F: ConnectionFactory> {
    factory: Arc<F>,
    state: Arc<Mutex<CacheState<F::Client>>>,
}

impl<F: ConnectionFactory> ConnectionCache<F> {
    /// Create an empty cache over `factory`.
    pub fn new(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Create an empty cache sharing an existing factory.
    pub fn with_factory(factory: Arc<F>) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// The factory used for misses.
    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// Return the cached handle for `store_name`, building it on first use.
    ///
    /// A hit makes no network call. On a miss exactly one build runs no
    /// matter how many callers arrive; a failed build leaves nothing behind
    /// and the next call retries.
    pub async fn get_or_create(&self, store_name: &str) -> TenantResult<SharedHandle<F::Client>> {
        let flight = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TenantError::ShuttingDown);
            }

            if let Some(handle) = state.handles.get(store_name) {
                if handle.is_initialized() {
                    return Ok(Arc::clone(handle));
                }
                debug!(fields: [store = store_name], "Dropping closed handle from cache");
                state.handles.remove(store_name);
            }

            match state.in_flight.get(store_name) {
                Some(flight) => {
                    debug!(fields: [store = store_name], "Joining in-flight build");
                    flight.clone()
                }
                None => {
                    debug!(fields: [store = store_name], "Cache miss, starting build");
                    let flight = self.start_build(store_name);
                    state
                        .in_flight
                        .insert(store_name.to_string(), flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    fn start_build(&self, store_name: &str) -> Flight<F::Client> {
        let factory = Arc::clone(&self.factory);
        let state = Arc::clone(&self.state);
        let name = store_name.to_string();

        let task = tokio::spawn({
            let state = Arc::clone(&state);
            let name = name.clone();
            async move {
                let handle = match factory.build(&name).await {
                    Ok(handle) if handle.is_initialized() => Arc::new(handle),
                    Ok(handle) => {
                        state.lock().in_flight.remove(&name);
                        let _ = handle.close().await;
                        return Err(TenantError::Connection(format!(
                            "{}: factory returned an uninitialized handle",
                            name
                        )));
                    }
                    Err(e) => {
                        state.lock().in_flight.remove(&name);
                        warn!(fields: [store = name], "Build failed: {}", e);
                        return Err(e);
                    }
                };

                let cached = {
                    let mut state = state.lock();
                    state.in_flight.remove(&name);
                    if state.closed {
                        false
                    } else {
                        state.handles.insert(name.clone(), Arc::clone(&handle));
                        true
                    }
                };

                if cached {
                    info!(fields: [store = name], "Connection cached");
                    Ok(handle)
                } else {
                    info!(fields: [store = name], "Cache drained during build, closing new handle");
                    if let Err(e) = handle.close().await {
                        warn!(fields: [store = name], "Close after drain failed: {}", e);
                    }
                    Err(TenantError::ShuttingDown)
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join) => {
                    state.lock().in_flight.remove(&name);
                    error!(fields: [store = name], "Build task aborted: {}", join);
                    Err(TenantError::Connection(format!(
                        "{}: build task aborted: {}",
                        name, join
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Close and forget the handle for `store_name`.
    ///
    /// Unknown names are a no-op. Close failures are logged, never returned.
    /// Returns whether a handle was cached. A build already in flight is not
    /// cancelled and caches its handle when it completes.
    pub async fn evict(&self, store_name: &str) -> bool {
        let handle = self.state.lock().handles.remove(store_name);
        let Some(handle) = handle else {
            debug!(fields: [store = store_name], "Evict: nothing cached");
            return false;
        };

        match handle.close().await {
            Ok(()) => info!(fields: [store = store_name], "Connection evicted"),
            Err(e) => warn!(
                fields: [store = store_name],
                "{}",
                TenantError::Eviction(e.to_string())
            ),
        }
        true
    }

    /// Close every cached handle and shut the cache.
    ///
    /// The map is empty afterwards and later `get_or_create` calls fail with
    /// [`TenantError::ShuttingDown`]. Builds still in flight are awaited;
    /// they close their own handle instead of caching it.
    pub async fn drain_all(&self) -> DrainReport {
        let (handles, flights) = {
            let mut state = self.state.lock();
            state.closed = true;
            let handles: Vec<_> = state.handles.drain().collect();
            let flights: Vec<_> = state.in_flight.values().cloned().collect();
            (handles, flights)
        };

        info!(
            fields: [handles = handles.len(), in_flight = flights.len()],
            "Draining connection cache"
        );

        let closes = handles.into_iter().map(|(name, handle)| async move {
            let result = handle.close().await;
            (name, result)
        });

        let mut report = DrainReport::default();
        for (name, result) in join_all(closes).await {
            match result {
                Ok(()) => report.closed.push(name),
                Err(e) => {
                    error!(fields: [store = name], "Close failed during drain: {}", e);
                    report.failed.push((name, TenantError::Eviction(e.to_string())));
                }
            }
        }

        join_all(flights).await;

        info!(
            fields: [closed = report.closed.len(), failed = report.failed.len()],
            "Connection cache drained"
        );
        report
    }

    /// Whether a handle for `store_name` is cached.
    pub fn contains(&self, store_name: &str) -> bool {
        self.state.lock().handles.contains_key(store_name)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Whether no handle is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of cached stores, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().handles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether [`drain_all`](Self::drain_all) has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for ConnectionCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionCache")
            .field("handles", &state.handles.len())
            .field("in_flight", &state.in_flight.len())
            .field("closed", &state.closed)
            .finish()
    }
}
