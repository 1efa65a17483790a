//! The entry point: executing operations against a schema.

use super::context::{Context, ExecutionContext, ExecutionId};
use super::fields::collect_fields;
use super::step_info::ExecutionStepInfo;
use super::strategy::{execute_fields, ExecutionStrategyParameters};
use super::subscription::subscribe_root_field;
use crate::config::ExecutionConfig;
use crate::dataloader::DataLoaderRegistry;
use crate::document::{Document, OperationType};
use crate::error::{ErrorClassification, GraphQLError};
use crate::fetcher::CodeRegistry;
use crate::instrumentation::dataloader::DataLoaderDispatcherInstrumentation;
use crate::instrumentation::{
    ChainedInstrumentation, Instrumentation, InstrumentationCreateStateParameters,
    InstrumentationExecuteOperationParameters, InstrumentationExecutionParameters, InstrumentationState,
    SimpleInstrumentation,
};
use crate::reactive::Publisher;
use crate::result::{to_execution_result, ExecutionResult, ExecutionResultNode};
use crate::schema::{Schema, TypeRef};
use crate::values::{coerce_variables, Variables};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// One request: the document, which operation of it to run and with what.
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    document: Arc<Document>,
    operation_name: Option<String>,
    variables: Variables,
    root_value: Value,
    context: Context,
    data_loader_registry: DataLoaderRegistry,
}

impl Default for ExecutionInput {
    fn default() -> Self {
        Self::new(Arc::new(Document::new()))
    }
}

impl ExecutionInput {
    pub fn new(document: impl Into<Arc<Document>>) -> Self {
        Self {
            document: document.into(),
            operation_name: None,
            variables: Variables::new(),
            root_value: Value::Null,
            context: Context::new(),
            data_loader_registry: DataLoaderRegistry::unset(),
        }
    }

    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_root_value(mut self, root_value: Value) -> Self {
        self.root_value = root_value;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_data_loader_registry(mut self, registry: DataLoaderRegistry) -> Self {
        self.data_loader_registry = registry;
        self
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn root_value(&self) -> &Value {
        &self.root_value
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The registry of this request. The unset registry unless one was supplied.
    pub fn data_loader_registry(&self) -> &DataLoaderRegistry {
        &self.data_loader_registry
    }
}

/// Executes operations against one schema and code registry.
#[derive(Clone)]
pub struct Engine {
    schema: Arc<Schema>,
    code_registry: Arc<CodeRegistry>,
    instrumentation: Arc<dyn Instrumentation>,
    config: ExecutionConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("code_registry", &self.code_registry)
            .field("config", &self.config)
            .finish()
    }
}

/// Builds an [`Engine`].
pub struct EngineBuilder {
    schema: Arc<Schema>,
    code_registry: Arc<CodeRegistry>,
    instrumentations: Vec<Arc<dyn Instrumentation>>,
    config: ExecutionConfig,
    add_default_instrumentations: bool,
}

impl EngineBuilder {
    /// Adds an instrumentation. Instrumentations run in the order they were added.
    #[must_use]
    pub fn instrumentation(mut self, instrumentation: impl Instrumentation) -> Self {
        self.instrumentations.push(Arc::new(instrumentation));
        self
    }

    #[must_use]
    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Leaves out the data loader dispatch instrumentation the engine adds by default.
    #[must_use]
    pub fn do_not_add_default_instrumentations(mut self) -> Self {
        self.add_default_instrumentations = false;
        self
    }

    pub fn build(self) -> Engine {
        let mut instrumentations = self.instrumentations;
        if self.add_default_instrumentations {
            instrumentations.push(Arc::new(DataLoaderDispatcherInstrumentation::new(
                self.config.dataloader.clone(),
            )));
        }
        let instrumentation: Arc<dyn Instrumentation> = match instrumentations.len() {
            0 => Arc::new(SimpleInstrumentation),
            1 => instrumentations.remove(0),
            _ => Arc::new(ChainedInstrumentation::new(instrumentations)),
        };
        Engine {
            schema: self.schema,
            code_registry: self.code_registry,
            instrumentation,
            config: self.config,
        }
    }
}

/// A context ready to run, with the step info of its root.
struct Prepared {
    ctx: Arc<ExecutionContext>,
    root: Arc<ExecutionStepInfo>,
}

impl Engine {
    pub fn builder(schema: impl Into<Arc<Schema>>, code_registry: impl Into<Arc<CodeRegistry>>) -> EngineBuilder {
        EngineBuilder {
            schema: schema.into(),
            code_registry: code_registry.into(),
            instrumentations: Vec::new(),
            config: ExecutionConfig::default(),
            add_default_instrumentations: true,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Executes the input's operation.
    pub async fn execute(&self, input: ExecutionInput) -> ExecutionResult {
        let execution_id = ExecutionId::generate();
        let span = info_span!(
            "execute",
            %execution_id,
            operation = input.operation_name().unwrap_or_default()
        );
        self.execute_with_id(execution_id, input).instrument(span).await
    }

    async fn execute_with_id(&self, execution_id: ExecutionId, input: ExecutionInput) -> ExecutionResult {
        let state = self.instrumentation.create_state(&InstrumentationCreateStateParameters {
            schema: &self.schema,
            execution_input: &input,
        });
        let input = self
            .instrumentation
            .instrument_execution_input(input, state.as_ref());
        let parameters = InstrumentationExecutionParameters {
            execution_input: &input,
            schema: &self.schema,
            execution_id,
        };
        let execution_ctx = self.instrumentation.begin_execution(&parameters, state.as_ref());

        let result = match self.prepare(execution_id, &input, state.clone()) {
            Ok(prepared) => self.execute_operation(prepared).await,
            Err(errors) => ExecutionResult::from_errors(errors),
        };
        execution_ctx.on_completed(&result);
        self.instrumentation
            .instrument_execution_result(result, &parameters, state.as_ref())
    }

    async fn execute_operation(&self, Prepared { ctx, root }: Prepared) -> ExecutionResult {
        let operation_ctx = match ctx.instrumentation.begin_execute_operation(
            &InstrumentationExecuteOperationParameters {
                execution_context: &ctx,
            },
            ctx.instrumentation_state(),
        ) {
            Ok(operation_ctx) => operation_ctx,
            Err(abort) => {
                debug!("execution aborted before fetching any field");
                return ExecutionResult::from_errors(abort.into_errors());
            }
        };

        let fields = collect_fields(
            ctx.schema(),
            ctx.document(),
            ctx.variables(),
            root.ty().named_type(),
            [&ctx.operation().selection_set],
        );
        let parameters = ExecutionStrategyParameters::new(root, ctx.root_value().clone(), None, fields);
        let kind = ctx.config().strategy_for(ctx.operation().operation);
        debug!(?kind, "executing operation");
        let children = execute_fields(Arc::clone(&ctx), parameters, kind);
        operation_ctx.on_dispatched();
        let children = children.await;

        let result = to_execution_result(&ExecutionResultNode::root(children, Vec::new()));
        operation_ctx.on_completed(&result);
        result
    }

    /// Subscribes to the input's subscription operation.
    ///
    /// Each event of the root field's source is executed against the operation and
    /// published as its own result. Failing to set up the subscription yields a result
    /// holding the errors.
    pub fn subscribe(&self, input: ExecutionInput) -> Result<Arc<dyn Publisher<ExecutionResult>>, ExecutionResult> {
        let execution_id = ExecutionId::generate();
        let span = info_span!(
            "subscribe",
            %execution_id,
            operation = input.operation_name().unwrap_or_default()
        );
        let _entered = span.enter();

        let state = self.instrumentation.create_state(&InstrumentationCreateStateParameters {
            schema: &self.schema,
            execution_input: &input,
        });
        let input = self
            .instrumentation
            .instrument_execution_input(input, state.as_ref());
        let Prepared { ctx, root } = self
            .prepare(execution_id, &input, state)
            .map_err(ExecutionResult::from_errors)?;

        if ctx.operation().operation != OperationType::Subscription {
            return Err(ExecutionResult::from_errors(vec![GraphQLError::new(
                format!("Cannot subscribe to a {} operation.", ctx.operation().operation),
                ErrorClassification::OperationNotSupported,
            )
            .with_location(ctx.operation().location.clone())]));
        }
        ctx.instrumentation
            .begin_execute_operation(
                &InstrumentationExecuteOperationParameters {
                    execution_context: &ctx,
                },
                ctx.instrumentation_state(),
            )
            .map_err(|abort| ExecutionResult::from_errors(abort.into_errors()))?;

        subscribe_root_field(ctx, root).map_err(ExecutionResult::from_errors)
    }

    /// Selects the operation, coerces variables and builds the execution context.
    fn prepare(
        &self,
        execution_id: ExecutionId,
        input: &ExecutionInput,
        instrumentation_state: Option<InstrumentationState>,
    ) -> Result<Prepared, Vec<GraphQLError>> {
        let operation = input
            .document()
            .operation(input.operation_name())
            .map_err(|error| vec![error])?
            .clone();
        let Some(root_type) = self.schema.root_type(operation.operation) else {
            return Err(vec![GraphQLError::new(
                format!("Schema is not configured for {} operations.", operation.operation),
                ErrorClassification::OperationNotSupported,
            )
            .with_location(operation.location.clone())]);
        };
        let root = Arc::new(ExecutionStepInfo::root(TypeRef::named_non_null(root_type)));
        let variables = coerce_variables(&operation, input.variables()).map_err(|error| vec![error])?;

        let ctx = ExecutionContext {
            execution_id,
            schema: Arc::clone(&self.schema),
            document: Arc::clone(input.document()),
            operation,
            variables: Arc::new(variables),
            root_value: input.root_value().clone(),
            context: input.context().clone(),
            data_loader_registry: input.data_loader_registry().clone(),
            code_registry: Arc::clone(&self.code_registry),
            instrumentation: Arc::clone(&self.instrumentation),
            instrumentation_state,
            config: self.config.clone(),
        };
        Ok(Prepared {
            ctx: Arc::new(ctx),
            root,
        })
    }
}
