//! Instrumentation hooks around every phase of an execution.
//!
//! An [`Instrumentation`] creates its own per-execution state in
//! [`Instrumentation::create_state`]; the engine hands that state back to every later hook
//! of the same execution. `begin_*` hooks return contexts that are told when the phase
//! was dispatched and when it completed.

mod chained;
pub mod dataloader;
pub mod field_validation;

pub use chained::ChainedInstrumentation;

use crate::error::{AbortExecution, GraphQLError};
use crate::execution::{
    ExecutionContext, ExecutionId, ExecutionInput, ExecutionStrategyParameters, FieldValueInfo,
};
use crate::fetcher::{DataFetcher, DataFetchingEnvironment, FetchResult};
use crate::result::{ExecutionResult, ExecutionResultNode};
use crate::schema::Schema;
use std::any::Any;
use std::sync::Arc;

/// Per-execution state owned by one instrumentation.
pub type InstrumentationState = Arc<dyn Any + Send + Sync>;

/// Told when a phase was dispatched and when it completed.
pub trait InstrumentationContext<T: ?Sized>: Send + Sync {
    fn on_dispatched(&self) {}

    fn on_completed(&self, _result: &T) {}
}

/// The context of one execution strategy call.
pub trait ExecutionStrategyInstrumentationContext: Send + Sync {
    fn on_dispatched(&self) {}

    fn on_completed(&self, _nodes: &[ExecutionResultNode]) {}

    /// Called once the fetched values of the strategy's fields were completed.
    fn on_field_values_info(&self, _infos: &[FieldValueInfo]) {}

    /// Called when fetching the strategy's fields failed outright.
    fn on_field_values_exception(&self, _error: &GraphQLError) {}
}

/// A context that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleInstrumentationContext;

impl<T: ?Sized> InstrumentationContext<T> for SimpleInstrumentationContext {}

impl ExecutionStrategyInstrumentationContext for SimpleInstrumentationContext {}

impl SimpleInstrumentationContext {
    pub fn noop<T: ?Sized>() -> Box<dyn InstrumentationContext<T>> {
        Box::new(Self)
    }

    pub fn noop_strategy() -> Box<dyn ExecutionStrategyInstrumentationContext> {
        Box::new(Self)
    }
}

pub struct InstrumentationCreateStateParameters<'a> {
    pub schema: &'a Arc<Schema>,
    pub execution_input: &'a ExecutionInput,
}

pub struct InstrumentationExecutionParameters<'a> {
    pub execution_input: &'a ExecutionInput,
    pub schema: &'a Arc<Schema>,
    pub execution_id: ExecutionId,
}

pub struct InstrumentationExecuteOperationParameters<'a> {
    pub execution_context: &'a Arc<ExecutionContext>,
}

pub struct InstrumentationExecutionStrategyParameters<'a> {
    pub execution_context: &'a Arc<ExecutionContext>,
    pub strategy_parameters: &'a ExecutionStrategyParameters,
}

pub struct InstrumentationFieldFetchParameters<'a> {
    pub execution_context: &'a Arc<ExecutionContext>,
    pub environment: &'a DataFetchingEnvironment,
    pub strategy_parameters: &'a ExecutionStrategyParameters,
}

/// Hooks around the phases of an execution. Every hook defaults to doing nothing.
pub trait Instrumentation: Send + Sync + 'static {
    /// Creates the state later hooks of this execution receive.
    fn create_state(
        &self,
        _parameters: &InstrumentationCreateStateParameters<'_>,
    ) -> Option<InstrumentationState> {
        None
    }

    /// May replace the execution input before anything else happens.
    fn instrument_execution_input(
        &self,
        input: ExecutionInput,
        _state: Option<&InstrumentationState>,
    ) -> ExecutionInput {
        input
    }

    fn begin_execution(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<ExecutionResult>> {
        SimpleInstrumentationContext::noop()
    }

    /// Called before the operation runs. Returning an error stops the execution before any
    /// field is fetched.
    fn begin_execute_operation(
        &self,
        _parameters: &InstrumentationExecuteOperationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Result<Box<dyn InstrumentationContext<ExecutionResult>>, AbortExecution> {
        Ok(SimpleInstrumentationContext::noop())
    }

    fn begin_execution_strategy(
        &self,
        _parameters: &InstrumentationExecutionStrategyParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        SimpleInstrumentationContext::noop_strategy()
    }

    fn begin_field_fetch(
        &self,
        _parameters: &InstrumentationFieldFetchParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<FetchResult>> {
        SimpleInstrumentationContext::noop()
    }

    /// May wrap or replace the fetcher about to be called.
    fn instrument_data_fetcher(
        &self,
        fetcher: Arc<dyn DataFetcher>,
        _parameters: &InstrumentationFieldFetchParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Arc<dyn DataFetcher> {
        fetcher
    }

    /// May rewrite the final result.
    fn instrument_execution_result(
        &self,
        result: ExecutionResult,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> ExecutionResult {
        result
    }
}

/// An instrumentation that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleInstrumentation;

impl Instrumentation for SimpleInstrumentation {}

/// Downcasts an instrumentation state to the concrete state `T`.
pub fn state_as<T: Any + Send + Sync>(state: Option<&InstrumentationState>) -> Option<&T> {
    state?.downcast_ref::<T>()
}
