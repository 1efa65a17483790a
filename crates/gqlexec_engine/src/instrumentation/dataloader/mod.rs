//! Dispatching data loaders at the right moments of an execution.
//!
//! With aggressive batching (queries under the async strategy) loaders are dispatched
//! per level by [`FieldLevelTrackingApproach`], so loads issued by sibling fetches end up
//! in one batch. Any other operation gets its fetchers wrapped so the registry is
//! dispatched right after every single fetch.

mod state;
mod tracking;

pub use state::DataLoaderDispatcherInstrumentationState;
pub use tracking::FieldLevelTrackingApproach;

use super::{
    state_as, ExecutionStrategyInstrumentationContext, Instrumentation, InstrumentationContext,
    InstrumentationCreateStateParameters, InstrumentationExecuteOperationParameters,
    InstrumentationExecutionParameters, InstrumentationExecutionStrategyParameters,
    InstrumentationFieldFetchParameters, InstrumentationState, SimpleInstrumentationContext,
};
use crate::config::{DataLoaderDispatcherOptions, ExecutionStrategyKind};
use crate::dataloader::DataLoaderRegistry;
use crate::document::OperationType;
use crate::error::AbortExecution;
use crate::fetcher::{DataFetcher, DataFetchingEnvironment, FetchResult};
use crate::result::ExecutionResult;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Dispatches the execution's data loaders so their loads get batched.
#[derive(Debug, Clone, Default)]
pub struct DataLoaderDispatcherInstrumentation {
    options: DataLoaderDispatcherOptions,
}

impl DataLoaderDispatcherInstrumentation {
    pub fn new(options: DataLoaderDispatcherOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DataLoaderDispatcherOptions {
        &self.options
    }
}

fn dispatcher_state(
    state: Option<&InstrumentationState>,
) -> Option<&DataLoaderDispatcherInstrumentationState> {
    state_as::<DataLoaderDispatcherInstrumentationState>(state)
}

/// Dispatches the registry as soon as the wrapped fetcher returns.
struct DispatchingDataFetcher {
    delegate: Arc<dyn DataFetcher>,
    registry: DataLoaderRegistry,
}

impl DataFetcher for DispatchingDataFetcher {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        let path = env.path().clone();
        let fetch = self.delegate.get(env);
        let dispatched = self.registry.dispatch_all();
        trace!(%path, dispatched, "dispatched data loaders after fetch");
        fetch
    }
}

impl Instrumentation for DataLoaderDispatcherInstrumentation {
    fn create_state(
        &self,
        parameters: &InstrumentationCreateStateParameters<'_>,
    ) -> Option<InstrumentationState> {
        let registry = parameters.execution_input.data_loader_registry().clone();
        Some(Arc::new(DataLoaderDispatcherInstrumentationState::new(registry)))
    }

    fn begin_execute_operation(
        &self,
        parameters: &InstrumentationExecuteOperationParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Result<Box<dyn InstrumentationContext<ExecutionResult>>, AbortExecution> {
        let Some(state) = dispatcher_state(state) else {
            return Ok(SimpleInstrumentationContext::noop());
        };
        let ctx = parameters.execution_context;
        // Earlier instrumentations may have replaced the registry.
        state.set_data_loader_registry(ctx.data_loader_registry().clone());

        let operation = ctx.operation().operation;
        let strategy = ctx.config().query_strategy;
        if operation != OperationType::Query || strategy != ExecutionStrategyKind::Async {
            debug!(%operation, ?strategy, "aggressive batching disabled");
            state.disable_aggressive_batching();
        }
        Ok(SimpleInstrumentationContext::noop())
    }

    fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        match dispatcher_state(state) {
            Some(state) if !state.has_no_data_loaders() => {
                state.approach().begin_execution_strategy(parameters)
            }
            _ => SimpleInstrumentationContext::noop_strategy(),
        }
    }

    fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldFetchParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<FetchResult>> {
        match dispatcher_state(state) {
            Some(state) if !state.has_no_data_loaders() => {
                state.approach().begin_field_fetch(parameters)
            }
            _ => SimpleInstrumentationContext::noop(),
        }
    }

    fn instrument_data_fetcher(
        &self,
        fetcher: Arc<dyn DataFetcher>,
        _parameters: &InstrumentationFieldFetchParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Arc<dyn DataFetcher> {
        match dispatcher_state(state) {
            Some(state) if !state.is_aggressive_batching() => Arc::new(DispatchingDataFetcher {
                delegate: fetcher,
                registry: state.data_loader_registry(),
            }),
            _ => fetcher,
        }
    }

    fn instrument_execution_result(
        &self,
        result: ExecutionResult,
        _parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> ExecutionResult {
        if !self.options.include_statistics {
            return result;
        }
        let Some(state) = dispatcher_state(state).filter(|state| !state.has_no_data_loaders()) else {
            return result;
        };
        let registry = state.data_loader_registry();
        let overall = registry.statistics();
        debug!(?overall, "data loader statistics");

        let individual: Map<String, Value> = registry
            .individual_statistics()
            .into_iter()
            .map(|(key, statistics)| (key, Value::Object(statistics.to_map())))
            .collect();
        let mut dataloader = Map::new();
        dataloader.insert("overall-statistics".into(), Value::Object(overall.to_map()));
        dataloader.insert("individual-statistics".into(), Value::Object(individual));
        result.with_extension("dataloader", Value::Object(dataloader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::dataloader::create_loader;
    use crate::document::OperationDefinition;
    use crate::execution::test_support::execution_context;
    use crate::execution::ExecutionInput;
    use crate::execution::ExecutionId;
    use crate::schema::Schema;
    use serde_json::json;
    use std::collections::HashMap;

    fn state_for(
        instrumentation: &DataLoaderDispatcherInstrumentation,
        input: &ExecutionInput,
    ) -> InstrumentationState {
        instrumentation
            .create_state(&InstrumentationCreateStateParameters {
                schema: &Arc::new(Schema::default()),
                execution_input: input,
            })
            .unwrap()
    }

    fn begin(
        instrumentation: &DataLoaderDispatcherInstrumentation,
        state: &InstrumentationState,
        operation: OperationDefinition,
        config: ExecutionConfig,
        registry: DataLoaderRegistry,
    ) {
        let mut ctx = execution_context(Schema::default(), operation, registry);
        ctx.config = config;
        let ctx = Arc::new(ctx);
        let parameters = InstrumentationExecuteOperationParameters {
            execution_context: &ctx,
        };
        assert!(instrumentation
            .begin_execute_operation(&parameters, Some(state))
            .is_ok());
    }

    #[test]
    fn test_create_state_detects_unset_registry() {
        let instrumentation = DataLoaderDispatcherInstrumentation::default();
        let state = state_for(&instrumentation, &ExecutionInput::default());
        assert!(dispatcher_state(Some(&state)).unwrap().has_no_data_loaders());
    }

    #[test]
    fn test_queries_under_async_keep_aggressive_batching() {
        let instrumentation = DataLoaderDispatcherInstrumentation::default();
        let state = state_for(&instrumentation, &ExecutionInput::default());
        begin(
            &instrumentation,
            &state,
            OperationDefinition::query(),
            ExecutionConfig::default(),
            DataLoaderRegistry::new(),
        );
        let state = dispatcher_state(Some(&state)).unwrap();
        assert!(state.is_aggressive_batching());
        assert!(!state.has_no_data_loaders(), "registry re-read from the context");
    }

    #[test]
    fn test_mutations_and_serial_queries_disable_aggressive_batching() {
        let instrumentation = DataLoaderDispatcherInstrumentation::default();

        let state = state_for(&instrumentation, &ExecutionInput::default());
        begin(
            &instrumentation,
            &state,
            OperationDefinition::mutation(),
            ExecutionConfig::default(),
            DataLoaderRegistry::new(),
        );
        assert!(!dispatcher_state(Some(&state)).unwrap().is_aggressive_batching());

        let state = state_for(&instrumentation, &ExecutionInput::default());
        begin(
            &instrumentation,
            &state,
            OperationDefinition::query(),
            ExecutionConfig::default().with_query_strategy(ExecutionStrategyKind::AsyncSerial),
            DataLoaderRegistry::new(),
        );
        assert!(!dispatcher_state(Some(&state)).unwrap().is_aggressive_batching());
    }

    #[tokio::test]
    async fn test_statistics_extension_keeps_existing_extensions() {
        let registry = DataLoaderRegistry::new();
        let loader = create_loader(|keys: Vec<u32>| async move {
            keys.into_iter().map(|k| (k, k)).collect::<HashMap<_, _>>()
        });
        registry.register("numbers", loader.clone());
        let load = loader.load(1);
        registry.dispatch_all();
        assert_eq!(load.await, Ok(Some(1)));

        let instrumentation = DataLoaderDispatcherInstrumentation::new(
            DataLoaderDispatcherOptions::default().with_include_statistics(true),
        );
        let input = ExecutionInput::default().with_data_loader_registry(registry);
        let state = state_for(&instrumentation, &input);
        let schema = Arc::new(Schema::default());
        let parameters = InstrumentationExecutionParameters {
            execution_input: &input,
            schema: &schema,
            execution_id: ExecutionId::generate(),
        };
        let result = instrumentation.instrument_execution_result(
            ExecutionResult::default().with_extension("cost", json!(1)),
            &parameters,
            Some(&state),
        );

        let extensions = result.extensions.unwrap();
        assert_eq!(extensions["cost"], json!(1));
        let dataloader = &extensions["dataloader"];
        assert_eq!(dataloader["overall-statistics"]["loadCount"], json!(1));
        assert_eq!(
            dataloader["individual-statistics"]["numbers"]["batchInvokeCount"],
            json!(1)
        );
    }

    #[test]
    fn test_statistics_disabled_by_default() {
        let instrumentation = DataLoaderDispatcherInstrumentation::default();
        let input = ExecutionInput::default();
        let state = state_for(&instrumentation, &input);
        let schema = Arc::new(Schema::default());
        let parameters = InstrumentationExecutionParameters {
            execution_input: &input,
            schema: &schema,
            execution_id: ExecutionId::generate(),
        };
        let result = instrumentation.instrument_execution_result(
            ExecutionResult::default(),
            &parameters,
            Some(&state),
        );
        assert!(result.extensions.is_none());
    }
}
