//! Batching and caching loaders.
//!
//! A [`DataLoader`] queues keys on [`DataLoader::load`] and only calls its
//! [`BatchLoader`] when dispatched, so loads issued in the same wave of field fetches end
//! up in one batch call. Who dispatches, and when, is decided by the data loader
//! dispatch instrumentation.

mod registry;
mod statistics;

pub use registry::{DataLoaderRegistry, Dispatchable};
pub use statistics::{Statistics, StatisticsCollector};

use crate::config::DataLoaderOptions;
use crate::error::FieldError;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// A load that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("batch load failed: {0}")]
    Batch(String),
    #[error("the data loader was dropped before the load completed")]
    Dropped,
    #[error("no Tokio runtime available to run the batch load")]
    NoRuntime,
}

impl From<LoadError> for FieldError {
    fn from(error: LoadError) -> Self {
        FieldError::new(error.to_string()).with_code("DATA_LOADER")
    }
}

/// Loads many keys in one call.
#[async_trait]
pub trait BatchLoader<K, V>: Send + Sync + 'static {
    /// Loads values for the given distinct keys. Keys missing from the result load as `None`.
    async fn load(&self, keys: Vec<K>) -> Result<HashMap<K, V>, LoadError>;
}

/// A batch loader backed by a closure.
pub struct FnBatchLoader<F> {
    func: F,
}

impl<F> FnBatchLoader<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<K, V, F, Fut> BatchLoader<K, V> for FnBatchLoader<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HashMap<K, V>, LoadError>> + Send + 'static,
{
    async fn load(&self, keys: Vec<K>) -> Result<HashMap<K, V>, LoadError> {
        (self.func)(keys).await
    }
}

type LoadResult<V> = Result<Option<V>, LoadError>;
type Waiter<V> = oneshot::Sender<LoadResult<V>>;

/// A DataLoader that batches and caches loads.
pub struct DataLoader<K, V> {
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V> {
    batch_loader: Arc<dyn BatchLoader<K, V>>,
    options: DataLoaderOptions,
    state: Mutex<LoaderState<K, V>>,
    statistics: StatisticsCollector,
}

struct LoaderState<K, V> {
    cache: FxHashMap<K, V>,
    queue: Vec<(K, Waiter<V>)>,
    /// Dispatched keys whose batch has not returned yet, with the loads that joined them.
    in_flight: FxHashMap<K, Vec<Waiter<V>>>,
}

impl<K, V> Clone for DataLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for DataLoader<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("options", &self.inner.options)
            .field("dispatch_depth", &self.inner.state.lock().queue.len())
            .finish()
    }
}

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new DataLoader.
    pub fn new(batch_loader: impl BatchLoader<K, V>) -> Self {
        Self::with_options(batch_loader, DataLoaderOptions::default())
    }

    /// Creates a DataLoader with options.
    pub fn with_options(batch_loader: impl BatchLoader<K, V>, options: DataLoaderOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                batch_loader: Arc::new(batch_loader),
                options,
                state: Mutex::new(LoaderState {
                    cache: FxHashMap::default(),
                    queue: Vec::new(),
                    in_flight: FxHashMap::default(),
                }),
                statistics: StatisticsCollector::new(),
            }),
        }
    }

    /// Creates a DataLoader from a fallible batch function.
    pub fn from_fn<F, Fut>(batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>, LoadError>> + Send + 'static,
    {
        Self::new(FnBatchLoader::new(batch_fn))
    }

    pub fn options(&self) -> &DataLoaderOptions {
        &self.inner.options
    }

    /// Loads a value by key.
    ///
    /// The key is queued (or answered from the cache) before this returns; the returned
    /// future only waits for the batch that carries it. With caching on, a key that is
    /// already being loaded joins that load instead of being queued again.
    pub fn load(&self, key: K) -> BoxFuture<'static, LoadResult<V>> {
        self.inner.statistics.increment_load_count();
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if self.inner.options.caching_enabled {
                if let Some(value) = state.cache.get(&key) {
                    self.inner.statistics.increment_cache_hit_count();
                    return future::ready(Ok(Some(value.clone()))).boxed();
                }
                if let Some(joined) = state.in_flight.get_mut(&key) {
                    self.inner.statistics.increment_cache_hit_count();
                    joined.push(sender);
                    return async move { receiver.await.unwrap_or(Err(LoadError::Dropped)) }.boxed();
                }
            }
            state.queue.push((key, sender));
        }
        if !self.inner.options.batching_enabled {
            self.dispatch();
        }
        async move { receiver.await.unwrap_or(Err(LoadError::Dropped)) }.boxed()
    }

    /// Loads multiple values, in key order.
    pub fn load_many(&self, keys: Vec<K>) -> BoxFuture<'static, Vec<LoadResult<V>>> {
        let loads: Vec<_> = keys.into_iter().map(|k| self.load(k)).collect();
        future::join_all(loads).boxed()
    }

    /// Sends every queued key to the batch loader. Returns the number of loads dispatched.
    pub fn dispatch(&self) -> usize {
        let queue = std::mem::take(&mut self.inner.state.lock().queue);
        if queue.is_empty() {
            return 0;
        }
        let dispatched = queue.len();

        let mut keys = Vec::new();
        let mut waiters: FxHashMap<K, Vec<Waiter<V>>> = FxHashMap::default();
        for (key, waiter) in queue {
            match waiters.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().push(waiter),
                Entry::Vacant(entry) => {
                    keys.push(entry.key().clone());
                    entry.insert(vec![waiter]);
                }
            }
        }

        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(
                loads = dispatched,
                "data loader dispatched outside of a Tokio runtime"
            );
            for (_, senders) in waiters {
                for sender in senders {
                    self.inner.statistics.increment_load_error_count();
                    let _ = sender.send(Err(LoadError::NoRuntime));
                }
            }
            return dispatched;
        };

        if self.inner.options.caching_enabled {
            let mut state = self.inner.state.lock();
            for key in &keys {
                state.in_flight.entry(key.clone()).or_default();
            }
        }

        let chunk_size = self.inner.options.max_batch_size.unwrap_or(usize::MAX).max(1);
        for chunk in keys.chunks(chunk_size) {
            let batch: Vec<(K, Vec<Waiter<V>>)> = chunk
                .iter()
                .filter_map(|k| waiters.remove_entry(k))
                .collect();
            self.inner
                .statistics
                .increment_batch_load_count(batch.len() as u64);
            tracing::debug!(keys = batch.len(), "dispatching data loader batch");
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move { inner.run_batch(batch).await });
        }
        dispatched
    }

    /// Number of loads waiting for a dispatch.
    pub fn dispatch_depth(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Puts a value in the cache unless the key is already cached.
    pub fn prime(&self, key: K, value: V) -> &Self {
        self.inner.state.lock().cache.entry(key).or_insert(value);
        self
    }

    /// Clears a specific key from the cache. A load of the key that is still in flight is
    /// not affected.
    pub fn clear(&self, key: &K) -> &Self {
        self.inner.state.lock().cache.remove(key);
        self
    }

    /// Clears the cache.
    pub fn clear_all(&self) -> &Self {
        self.inner.state.lock().cache.clear();
        self
    }

    pub fn statistics(&self) -> Statistics {
        self.inner.statistics.snapshot()
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn run_batch(&self, mut batch: Vec<(K, Vec<Waiter<V>>)>) {
        let keys = batch.iter().map(|(k, _)| k.clone()).collect();
        let loaded = self.batch_loader.load(keys).await;
        if self.options.caching_enabled {
            // cache and in-flight entries change under one lock so no load falls between them
            let mut state = self.state.lock();
            if let Ok(values) = &loaded {
                for (key, value) in values {
                    state.cache.insert(key.clone(), value.clone());
                }
            }
            for (key, senders) in &mut batch {
                if let Some(joined) = state.in_flight.remove(&*key) {
                    senders.extend(joined);
                }
            }
        }
        match loaded {
            Ok(values) => {
                for (key, senders) in batch {
                    let value = values.get(&key);
                    for sender in senders {
                        let _ = sender.send(Ok(value.cloned()));
                    }
                }
            }
            Err(error) => {
                self.statistics.increment_batch_load_exception_count();
                tracing::debug!(%error, "data loader batch failed");
                for (_, senders) in batch {
                    for sender in senders {
                        self.statistics.increment_load_error_count();
                        let _ = sender.send(Err(error.clone()));
                    }
                }
            }
        }
    }
}

/// Creates a DataLoader from an infallible batch function.
pub fn create_loader<K, V, F, Fut>(batch_fn: F) -> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HashMap<K, V>> + Send + 'static,
{
    DataLoader::from_fn(move |keys| batch_fn(keys).map(Ok))
}
