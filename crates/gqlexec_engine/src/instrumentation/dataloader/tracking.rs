//! Per-level tracking of field fetches.
//!
//! Every level of the result tree is dispatched exactly once, as soon as all fetches that
//! can queue loads for it have been started. A level `N > 1` is ready when level `N - 1`
//! is ready, every strategy call of level `N - 1` has reported its field values, every
//! strategy call expected at level `N` has begun, and every fetch of level `N` has been
//! started.

use crate::dataloader::DataLoaderRegistry;
use crate::execution::{CompleteValueType, FieldValueInfo};
use crate::fetcher::FetchResult;
use crate::instrumentation::{
    ExecutionStrategyInstrumentationContext, InstrumentationContext,
    InstrumentationExecutionStrategyParameters, InstrumentationFieldFetchParameters,
};
use crate::error::GraphQLError;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct CallStack {
    expected_fetch_count_per_level: FxHashMap<usize, usize>,
    fetch_count_per_level: FxHashMap<usize, usize>,
    expected_strategy_calls_per_level: FxHashMap<usize, usize>,
    happened_strategy_calls_per_level: FxHashMap<usize, usize>,
    happened_on_field_value_calls_per_level: FxHashMap<usize, usize>,
    dispatched_levels: FxHashSet<usize>,
}

fn count(map: &FxHashMap<usize, usize>, level: usize) -> usize {
    map.get(&level).copied().unwrap_or(0)
}

fn increase(map: &mut FxHashMap<usize, usize>, level: usize, by: usize) {
    *map.entry(level).or_insert(0) += by;
}

impl CallStack {
    fn new() -> Self {
        let mut expected_strategy_calls_per_level = FxHashMap::default();
        // The operation itself is the one strategy call of the first level.
        expected_strategy_calls_per_level.insert(1, 1);
        Self {
            expected_fetch_count_per_level: FxHashMap::default(),
            fetch_count_per_level: FxHashMap::default(),
            expected_strategy_calls_per_level,
            happened_strategy_calls_per_level: FxHashMap::default(),
            happened_on_field_value_calls_per_level: FxHashMap::default(),
            dispatched_levels: FxHashSet::default(),
        }
    }

    fn all_strategy_calls_happened(&self, level: usize) -> bool {
        count(&self.happened_strategy_calls_per_level, level)
            == count(&self.expected_strategy_calls_per_level, level)
    }

    fn all_on_field_calls_happened(&self, level: usize) -> bool {
        count(&self.happened_on_field_value_calls_per_level, level)
            == count(&self.expected_strategy_calls_per_level, level)
    }

    fn all_fetches_happened(&self, level: usize) -> bool {
        count(&self.fetch_count_per_level, level)
            == count(&self.expected_fetch_count_per_level, level)
    }

    fn level_ready(&self, level: usize) -> bool {
        if level <= 1 {
            return self.all_fetches_happened(1);
        }
        self.level_ready(level - 1)
            && self.all_on_field_calls_happened(level - 1)
            && self.all_strategy_calls_happened(level)
            && self.all_fetches_happened(level)
    }

    /// Marks `level` dispatched if it is ready. Returns true if the caller must dispatch.
    fn dispatch_if_needed(&mut self, level: usize) -> bool {
        if !self.level_ready(level) {
            trace!(level, "level not ready for dispatch");
            return false;
        }
        if !self.dispatched_levels.insert(level) {
            warn!(level, "level was already dispatched");
            return false;
        }
        true
    }
}

/// Counts the objects among `infos`, looking into lists.
fn count_objects(infos: &[FieldValueInfo]) -> usize {
    infos
        .iter()
        .map(|info| match info.complete_value_type() {
            CompleteValueType::Object => 1,
            CompleteValueType::List => count_objects(info.field_value_infos()),
            _ => 0,
        })
        .sum()
}

/// Dispatches the data loader registry level by level.
#[derive(Clone)]
pub struct FieldLevelTrackingApproach {
    call_stack: Arc<Mutex<CallStack>>,
    registry: Arc<RwLock<DataLoaderRegistry>>,
}

impl FieldLevelTrackingApproach {
    pub(crate) fn new(registry: Arc<RwLock<DataLoaderRegistry>>) -> Self {
        Self {
            call_stack: Arc::new(Mutex::new(CallStack::new())),
            registry,
        }
    }

    pub(crate) fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        let strategy = parameters.strategy_parameters;
        Box::new(self.begin_strategy_at(strategy.path().level(), strategy.fields().len()))
    }

    pub(crate) fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldFetchParameters<'_>,
    ) -> Box<dyn InstrumentationContext<FetchResult>> {
        Box::new(FetchContext {
            approach: self.clone(),
            level: parameters.environment.path().level(),
        })
    }

    fn begin_strategy_at(&self, parent_level: usize, field_count: usize) -> StrategyContext {
        let level = parent_level + 1;
        let dispatch_needed = {
            let mut call_stack = self.call_stack.lock();
            increase(&mut call_stack.expected_fetch_count_per_level, level, field_count);
            increase(&mut call_stack.happened_strategy_calls_per_level, level, 1);
            field_count == 0 && call_stack.dispatch_if_needed(level)
        };
        if dispatch_needed {
            self.dispatch(level);
        }
        StrategyContext {
            approach: self.clone(),
            level,
        }
    }

    fn field_fetched(&self, level: usize) {
        let dispatch_needed = {
            let mut call_stack = self.call_stack.lock();
            increase(&mut call_stack.fetch_count_per_level, level, 1);
            call_stack.dispatch_if_needed(level)
        };
        if dispatch_needed {
            self.dispatch(level);
        }
    }

    fn field_values_completed(&self, level: usize, infos: &[FieldValueInfo]) {
        let dispatch_needed = {
            let mut call_stack = self.call_stack.lock();
            increase(&mut call_stack.happened_on_field_value_calls_per_level, level, 1);
            increase(
                &mut call_stack.expected_strategy_calls_per_level,
                level + 1,
                count_objects(infos),
            );
            call_stack.dispatch_if_needed(level + 1)
        };
        if dispatch_needed {
            self.dispatch(level + 1);
        }
    }

    fn dispatch(&self, level: usize) {
        let registry = self.registry.read().clone();
        let dispatched = registry.dispatch_all();
        debug!(level, dispatched, "dispatched data loaders");
    }

    #[cfg(test)]
    pub(crate) fn dispatched_levels(&self) -> Vec<usize> {
        let mut levels: Vec<_> = self.call_stack.lock().dispatched_levels.iter().copied().collect();
        levels.sort_unstable();
        levels
    }
}

struct StrategyContext {
    approach: FieldLevelTrackingApproach,
    level: usize,
}

impl ExecutionStrategyInstrumentationContext for StrategyContext {
    fn on_field_values_info(&self, infos: &[FieldValueInfo]) {
        self.approach.field_values_completed(self.level, infos);
    }

    fn on_field_values_exception(&self, error: &GraphQLError) {
        debug!(level = self.level, %error, "field values failed");
    }
}

struct FetchContext {
    approach: FieldLevelTrackingApproach,
    level: usize,
}

impl InstrumentationContext<FetchResult> for FetchContext {
    fn on_dispatched(&self) {
        self.approach.field_fetched(self.level);
    }
}
