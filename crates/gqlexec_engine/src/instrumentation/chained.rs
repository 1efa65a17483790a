use super::{
    ExecutionStrategyInstrumentationContext, Instrumentation, InstrumentationContext,
    InstrumentationCreateStateParameters, InstrumentationExecuteOperationParameters,
    InstrumentationExecutionParameters, InstrumentationExecutionStrategyParameters,
    InstrumentationFieldFetchParameters, InstrumentationState,
};
use crate::error::{AbortExecution, GraphQLError};
use crate::execution::{ExecutionInput, FieldValueInfo};
use crate::fetcher::{DataFetcher, FetchResult};
use crate::result::{ExecutionResult, ExecutionResultNode};
use std::sync::Arc;

/// Runs several instrumentations in order, each with its own state.
#[derive(Clone, Default)]
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

struct ChainedState {
    states: Vec<Option<InstrumentationState>>,
}

impl ChainedInstrumentation {
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> Self {
        Self { instrumentations }
    }

    /// Appends an instrumentation to the chain.
    #[must_use]
    pub fn with(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentations.push(instrumentation);
        self
    }

    pub fn instrumentations(&self) -> &[Arc<dyn Instrumentation>] {
        &self.instrumentations
    }

    fn each<'s>(
        &'s self,
        state: Option<&'s InstrumentationState>,
    ) -> impl Iterator<Item = (&'s Arc<dyn Instrumentation>, Option<&'s InstrumentationState>)> {
        let states = state.and_then(|s| s.downcast_ref::<ChainedState>());
        self.instrumentations
            .iter()
            .enumerate()
            .map(move |(i, instrumentation)| {
                let own = states.and_then(|s| s.states.get(i)).and_then(Option::as_ref);
                (instrumentation, own)
            })
    }
}

struct ChainedContext<T: ?Sized> {
    contexts: Vec<Box<dyn InstrumentationContext<T>>>,
}

impl<T: ?Sized> InstrumentationContext<T> for ChainedContext<T> {
    fn on_dispatched(&self) {
        self.contexts.iter().for_each(|c| c.on_dispatched());
    }

    fn on_completed(&self, result: &T) {
        self.contexts.iter().for_each(|c| c.on_completed(result));
    }
}

struct ChainedStrategyContext {
    contexts: Vec<Box<dyn ExecutionStrategyInstrumentationContext>>,
}

impl ExecutionStrategyInstrumentationContext for ChainedStrategyContext {
    fn on_dispatched(&self) {
        self.contexts.iter().for_each(|c| c.on_dispatched());
    }

    fn on_completed(&self, nodes: &[ExecutionResultNode]) {
        self.contexts.iter().for_each(|c| c.on_completed(nodes));
    }

    fn on_field_values_info(&self, infos: &[FieldValueInfo]) {
        self.contexts.iter().for_each(|c| c.on_field_values_info(infos));
    }

    fn on_field_values_exception(&self, error: &GraphQLError) {
        self.contexts
            .iter()
            .for_each(|c| c.on_field_values_exception(error));
    }
}

impl Instrumentation for ChainedInstrumentation {
    fn create_state(
        &self,
        parameters: &InstrumentationCreateStateParameters<'_>,
    ) -> Option<InstrumentationState> {
        let states = self
            .instrumentations
            .iter()
            .map(|i| i.create_state(parameters))
            .collect();
        Some(Arc::new(ChainedState { states }))
    }

    fn instrument_execution_input(
        &self,
        input: ExecutionInput,
        state: Option<&InstrumentationState>,
    ) -> ExecutionInput {
        self.each(state)
            .fold(input, |input, (i, own)| i.instrument_execution_input(input, own))
    }

    fn begin_execution(
        &self,
        parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        Box::new(ChainedContext {
            contexts: self
                .each(state)
                .map(|(i, own)| i.begin_execution(parameters, own))
                .collect(),
        })
    }

    fn begin_execute_operation(
        &self,
        parameters: &InstrumentationExecuteOperationParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Result<Box<dyn InstrumentationContext<ExecutionResult>>, AbortExecution> {
        let contexts = self
            .each(state)
            .map(|(i, own)| i.begin_execute_operation(parameters, own))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(ChainedContext { contexts }))
    }

    fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        Box::new(ChainedStrategyContext {
            contexts: self
                .each(state)
                .map(|(i, own)| i.begin_execution_strategy(parameters, own))
                .collect(),
        })
    }

    fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldFetchParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<FetchResult>> {
        Box::new(ChainedContext {
            contexts: self
                .each(state)
                .map(|(i, own)| i.begin_field_fetch(parameters, own))
                .collect(),
        })
    }

    fn instrument_data_fetcher(
        &self,
        fetcher: Arc<dyn DataFetcher>,
        parameters: &InstrumentationFieldFetchParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Arc<dyn DataFetcher> {
        self.each(state).fold(fetcher, |fetcher, (i, own)| {
            i.instrument_data_fetcher(fetcher, parameters, own)
        })
    }

    fn instrument_execution_result(
        &self,
        result: ExecutionResult,
        parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> ExecutionResult {
        self.each(state).fold(result, |result, (i, own)| {
            i.instrument_execution_result(result, parameters, own)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionId;
    use crate::schema::Schema;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Tagging {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Instrumentation for Tagging {
        fn create_state(
            &self,
            _parameters: &InstrumentationCreateStateParameters<'_>,
        ) -> Option<InstrumentationState> {
            Some(Arc::new(self.tag.to_string()))
        }

        fn instrument_execution_result(
            &self,
            result: ExecutionResult,
            _parameters: &InstrumentationExecutionParameters<'_>,
            state: Option<&InstrumentationState>,
        ) -> ExecutionResult {
            let own = super::super::state_as::<String>(state).cloned().unwrap_or_default();
            self.seen.lock().push(own);
            result.with_extension(self.tag, json!(true))
        }
    }

    #[test]
    fn test_each_instrumentation_gets_its_own_state_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chained = ChainedInstrumentation::default()
            .with(Arc::new(Tagging {
                tag: "first",
                seen: Arc::clone(&seen),
            }))
            .with(Arc::new(Tagging {
                tag: "second",
                seen: Arc::clone(&seen),
            }));

        let schema = Arc::new(Schema::default());
        let input = ExecutionInput::default();
        let state = chained.create_state(&InstrumentationCreateStateParameters {
            schema: &schema,
            execution_input: &input,
        });
        let parameters = InstrumentationExecutionParameters {
            execution_input: &input,
            schema: &schema,
            execution_id: ExecutionId::generate(),
        };
        let result =
            chained.instrument_execution_result(ExecutionResult::default(), &parameters, state.as_ref());

        assert_eq!(*seen.lock(), vec!["first".to_string(), "second".to_string()]);
        let extensions = result.extensions.unwrap();
        assert_eq!(extensions.keys().collect::<Vec<_>>(), vec!["first", "second"]);
    }
}
