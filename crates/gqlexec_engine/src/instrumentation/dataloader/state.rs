use super::tracking::FieldLevelTrackingApproach;
use crate::dataloader::DataLoaderRegistry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-execution state of the data loader dispatch instrumentation.
pub struct DataLoaderDispatcherInstrumentationState {
    registry: Arc<RwLock<DataLoaderRegistry>>,
    aggressive_batching: AtomicBool,
    has_no_data_loaders: AtomicBool,
    approach: FieldLevelTrackingApproach,
}

impl DataLoaderDispatcherInstrumentationState {
    pub fn new(registry: DataLoaderRegistry) -> Self {
        let has_no_data_loaders = registry.is_unset();
        let registry = Arc::new(RwLock::new(registry));
        Self {
            approach: FieldLevelTrackingApproach::new(Arc::clone(&registry)),
            registry,
            aggressive_batching: AtomicBool::new(true),
            has_no_data_loaders: AtomicBool::new(has_no_data_loaders),
        }
    }

    pub fn data_loader_registry(&self) -> DataLoaderRegistry {
        self.registry.read().clone()
    }

    /// Replaces the registry and recomputes whether there are data loaders at all.
    pub fn set_data_loader_registry(&self, registry: DataLoaderRegistry) {
        self.has_no_data_loaders
            .store(registry.is_unset(), Ordering::Release);
        *self.registry.write() = registry;
    }

    pub fn is_aggressive_batching(&self) -> bool {
        self.aggressive_batching.load(Ordering::Acquire)
    }

    /// Turns aggressive batching off for the rest of the execution.
    pub fn disable_aggressive_batching(&self) {
        self.aggressive_batching.store(false, Ordering::Release);
    }

    pub fn has_no_data_loaders(&self) -> bool {
        self.has_no_data_loaders.load(Ordering::Acquire)
    }

    pub(crate) fn approach(&self) -> &FieldLevelTrackingApproach {
        &self.approach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_swap_recomputes_flag() {
        let state = DataLoaderDispatcherInstrumentationState::new(DataLoaderRegistry::unset());
        assert!(state.has_no_data_loaders());

        let registry = DataLoaderRegistry::new();
        state.set_data_loader_registry(registry.clone());
        assert!(!state.has_no_data_loaders());
        assert!(state.data_loader_registry().ptr_eq(&registry));
    }

    #[test]
    fn test_aggressive_batching_is_one_way() {
        let state = DataLoaderDispatcherInstrumentationState::new(DataLoaderRegistry::new());
        assert!(state.is_aggressive_batching());
        state.disable_aggressive_batching();
        state.disable_aggressive_batching();
        assert!(!state.is_aggressive_batching());
    }
}
