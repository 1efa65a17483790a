//! Named data loaders shared by one execution.

use super::{DataLoader, Statistics};
use crate::assert::should_never_happen;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;

/// The type-erased view of a loader the registry needs.
pub trait Dispatchable: Send + Sync + 'static {
    /// Dispatches queued loads, returning how many were sent.
    fn dispatch(&self) -> usize;
    fn dispatch_depth(&self) -> usize;
    fn statistics(&self) -> Statistics;
    fn as_any(&self) -> &dyn Any;
}

impl<K, V> Dispatchable for DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn dispatch(&self) -> usize {
        DataLoader::dispatch(self)
    }

    fn dispatch_depth(&self) -> usize {
        DataLoader::dispatch_depth(self)
    }

    fn statistics(&self) -> Statistics {
        DataLoader::statistics(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Data loaders by name, in registration order.
///
/// Cloning shares the same loaders. [`DataLoaderRegistry::unset`] is the registry an
/// execution gets when none was supplied: it reads as empty, and any attempt to add or
/// remove loaders from it panics.
#[derive(Clone)]
pub struct DataLoaderRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    loaders: RwLock<IndexMap<String, Arc<dyn Dispatchable>>>,
    unset: bool,
}

impl Default for DataLoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataLoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoaderRegistry")
            .field("keys", &self.keys())
            .field("unset", &self.inner.unset)
            .finish()
    }
}

impl DataLoaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::build(false)
    }

    /// The registry used when an execution was given none.
    pub fn unset() -> Self {
        Self::build(true)
    }

    fn build(unset: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                loaders: RwLock::new(IndexMap::new()),
                unset,
            }),
        }
    }

    /// Returns true for the registry of an execution that was given none.
    pub fn is_unset(&self) -> bool {
        self.inner.unset
    }

    /// Returns true if both handles share the same loaders.
    pub fn ptr_eq(&self, other: &DataLoaderRegistry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[track_caller]
    fn assert_set(&self, operation: &str) {
        if self.inner.unset {
            should_never_happen(format!(
                "'{operation}' called on the unset data loader registry; supply a registry with the execution input"
            ));
        }
    }

    /// Registers a loader under `key`, replacing any previous one.
    #[track_caller]
    pub fn register<K, V>(&self, key: impl Into<String>, loader: DataLoader<K, V>) -> &Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.assert_set("register");
        self.inner.loaders.write().insert(key.into(), Arc::new(loader));
        self
    }

    /// Returns the loader under `key`, registering the one built by `create` if absent.
    #[track_caller]
    pub fn compute_if_absent<K, V>(
        &self,
        key: &str,
        create: impl FnOnce() -> DataLoader<K, V>,
    ) -> DataLoader<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.assert_set("compute_if_absent");
        let existing = self.inner.loaders.read().get(key).cloned();
        // `create` runs without the lock held so it may use the registry itself
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let created: Arc<dyn Dispatchable> = Arc::new(create());
                Arc::clone(
                    self.inner
                        .loaders
                        .write()
                        .entry(key.to_string())
                        .or_insert(created),
                )
            }
        };
        match entry.as_any().downcast_ref::<DataLoader<K, V>>() {
            Some(loader) => loader.clone(),
            None => should_never_happen(format!(
                "data loader '{key}' is registered with different key or value types"
            )),
        }
    }

    /// Removes the loader under `key`. Returns true if there was one.
    #[track_caller]
    pub fn unregister(&self, key: &str) -> bool {
        self.assert_set("unregister");
        self.inner.loaders.write().shift_remove(key).is_some()
    }

    /// Returns the loader under `key`, if it has these key and value types.
    pub fn get<K, V>(&self, key: &str) -> Option<DataLoader<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.inner
            .loaders
            .read()
            .get(key)?
            .as_any()
            .downcast_ref::<DataLoader<K, V>>()
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.loaders.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.loaders.read().is_empty()
    }

    fn loaders(&self) -> Vec<(String, Arc<dyn Dispatchable>)> {
        self.inner
            .loaders
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    /// Dispatches every loader. Returns the number of loads sent.
    pub fn dispatch_all(&self) -> usize {
        self.loaders()
            .into_iter()
            .map(|(_, loader)| loader.dispatch())
            .sum()
    }

    /// Loads waiting for a dispatch, across every loader.
    pub fn dispatch_depth(&self) -> usize {
        self.loaders()
            .into_iter()
            .map(|(_, loader)| loader.dispatch_depth())
            .sum()
    }

    /// Combined statistics of every loader.
    pub fn statistics(&self) -> Statistics {
        self.loaders()
            .into_iter()
            .fold(Statistics::default(), |acc, (_, loader)| {
                acc.combine(&loader.statistics())
            })
    }

    /// Statistics of each loader, by key.
    pub fn individual_statistics(&self) -> IndexMap<String, Statistics> {
        self.loaders()
            .into_iter()
            .map(|(key, loader)| (key, loader.statistics()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::create_loader;
    use std::collections::HashMap;

    fn loader() -> DataLoader<u32, String> {
        create_loader(|keys: Vec<u32>| async move {
            keys.into_iter()
                .map(|k| (k, format!("v{k}")))
                .collect::<HashMap<_, _>>()
        })
    }

    #[test]
    fn test_register_and_typed_get() {
        let registry = DataLoaderRegistry::new();
        registry.register("users", loader());

        assert!(registry.get::<u32, String>("users").is_some());
        assert!(registry.get::<String, String>("users").is_none());
        assert!(registry.get::<u32, String>("missing").is_none());
        assert_eq!(registry.keys(), vec!["users".to_string()]);
    }

    #[test]
    fn test_compute_if_absent_reuses_existing() {
        let registry = DataLoaderRegistry::new();
        let first = registry.compute_if_absent("users", loader);
        first.prime(1, "primed".to_string());
        let second = registry.compute_if_absent("users", loader);
        assert_eq!(
            futures::executor::block_on(second.load(1)),
            Ok(Some("primed".to_string()))
        );
        assert_eq!(registry.keys().len(), 1);
    }

    #[test]
    fn test_compute_if_absent_create_can_use_the_registry() {
        let registry = DataLoaderRegistry::new();
        registry.register("users", loader());

        let posts = registry.compute_if_absent("posts", || {
            assert_eq!(registry.keys(), vec!["users".to_string()]);
            assert!(registry.get::<u32, String>("users").is_some());
            registry.register("comments", loader());
            loader()
        });

        posts.prime(2, "post".to_string());
        assert_eq!(
            registry.keys(),
            vec!["users".to_string(), "comments".to_string(), "posts".to_string()]
        );
        assert_eq!(
            futures::executor::block_on(registry.get::<u32, String>("posts").unwrap().load(2)),
            Ok(Some("post".to_string()))
        );
    }

    #[test]
    fn test_unregister() {
        let registry = DataLoaderRegistry::new();
        registry.register("a", loader()).register("b", loader());
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.keys(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_all_and_statistics() {
        let registry = DataLoaderRegistry::new();
        registry.register("a", loader()).register("b", loader());
        let a = registry.get::<u32, String>("a").unwrap();
        let b = registry.get::<u32, String>("b").unwrap();

        let loads = futures::future::join(a.load(1), b.load(2));
        assert_eq!(registry.dispatch_depth(), 2);
        assert_eq!(registry.dispatch_all(), 2);
        let (x, y) = loads.await;
        assert_eq!(x, Ok(Some("v1".to_string())));
        assert_eq!(y, Ok(Some("v2".to_string())));

        assert_eq!(registry.statistics().batch_invoke_count, 2);
        assert_eq!(registry.individual_statistics()["a"].load_count, 1);
    }

    #[test]
    fn test_unset_reads_as_empty() {
        let registry = DataLoaderRegistry::unset();
        assert!(registry.is_unset());
        assert!(registry.keys().is_empty());
        assert_eq!(registry.dispatch_all(), 0);
        assert!(registry.get::<u32, String>("a").is_none());
    }

    #[test]
    #[should_panic(expected = "should never happen")]
    fn test_unset_register_panics() {
        DataLoaderRegistry::unset().register("a", loader());
    }

    #[test]
    #[should_panic(expected = "should never happen")]
    fn test_unset_compute_if_absent_panics() {
        DataLoaderRegistry::unset().compute_if_absent("a", loader);
    }

    #[test]
    #[should_panic(expected = "should never happen")]
    fn test_unset_unregister_panics() {
        DataLoaderRegistry::unset().unregister("a");
    }
}
