//! Execution strategies: fetching the fields of a selection set and completing their
//! values into result nodes.

use super::context::ExecutionContext;
use super::fields::{collect_fields, MergedField};
use super::step_info::ExecutionStepInfo;
use crate::assert::should_never_happen;
use crate::config::ExecutionStrategyKind;
use crate::error::{ErrorClassification, GraphQLError};
use crate::fetcher::{DataFetcherResult, DataFetchingEnvironment, FetchResult, LocalContext};
use crate::instrumentation::{
    ExecutionStrategyInstrumentationContext, InstrumentationExecutionStrategyParameters,
    InstrumentationFieldFetchParameters,
};
use crate::path::ResultPath;
use crate::result::{ExecutionResultNode, NonNullableFieldWasNullError, ResolvedValue};
use crate::schema::{TypeDef, TypeRef};
use crate::values::resolve_arguments;
use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::trace;

/// The selection set one strategy call executes, with the object it executes it on.
#[derive(Clone)]
pub struct ExecutionStrategyParameters {
    step_info: Arc<ExecutionStepInfo>,
    source: Value,
    local_context: Option<LocalContext>,
    fields: IndexMap<String, MergedField>,
}

impl fmt::Debug for ExecutionStrategyParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStrategyParameters")
            .field("path", &self.step_info.path().to_string())
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExecutionStrategyParameters {
    pub(crate) fn new(
        step_info: Arc<ExecutionStepInfo>,
        source: Value,
        local_context: Option<LocalContext>,
        fields: IndexMap<String, MergedField>,
    ) -> Self {
        Self {
            step_info,
            source,
            local_context,
            fields,
        }
    }

    /// Path of the object whose fields are executed.
    pub fn path(&self) -> &ResultPath {
        self.step_info.path()
    }

    pub fn fields(&self) -> &IndexMap<String, MergedField> {
        &self.fields
    }

    pub fn step_info(&self) -> &Arc<ExecutionStepInfo> {
        &self.step_info
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn local_context(&self) -> Option<&LocalContext> {
        self.local_context.as_ref()
    }
}

/// What a field value completed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteValueType {
    Object,
    List,
    Null,
    Scalar,
    Enum,
}

/// The shape of one completed value. Lists carry the infos of their items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValueInfo {
    complete_value_type: CompleteValueType,
    field_value_infos: Vec<FieldValueInfo>,
}

impl FieldValueInfo {
    pub fn new(complete_value_type: CompleteValueType, field_value_infos: Vec<FieldValueInfo>) -> Self {
        Self {
            complete_value_type,
            field_value_infos,
        }
    }

    pub fn complete_value_type(&self) -> CompleteValueType {
        self.complete_value_type
    }

    pub fn field_value_infos(&self) -> &[FieldValueInfo] {
        &self.field_value_infos
    }
}

/// Executes the fields of `parameters` with `kind`, returning one node per field.
pub(crate) fn execute_fields(
    ctx: Arc<ExecutionContext>,
    parameters: ExecutionStrategyParameters,
    kind: ExecutionStrategyKind,
) -> BoxFuture<'static, Vec<ExecutionResultNode>> {
    async move {
        let strategy_ctx = ctx.instrumentation.begin_execution_strategy(
            &InstrumentationExecutionStrategyParameters {
                execution_context: &ctx,
                strategy_parameters: &parameters,
            },
            ctx.instrumentation_state(),
        );
        let nodes = match kind {
            ExecutionStrategyKind::Async => execute_async(&ctx, &parameters, strategy_ctx.as_ref()).await,
            ExecutionStrategyKind::AsyncSerial => {
                execute_serial(&ctx, &parameters, strategy_ctx.as_ref()).await
            }
        };
        strategy_ctx.on_completed(&nodes);
        nodes
    }
    .boxed()
}

/// Starts every fetch before awaiting any, then resolves nested objects concurrently.
async fn execute_async(
    ctx: &Arc<ExecutionContext>,
    parameters: &ExecutionStrategyParameters,
    strategy_ctx: &dyn ExecutionStrategyInstrumentationContext,
) -> Vec<ExecutionResultNode> {
    let fetches: Vec<_> = parameters
        .fields()
        .values()
        .map(|field| fetch_field(ctx, parameters, field))
        .collect();
    strategy_ctx.on_dispatched();

    let completed = AssertUnwindSafe(async {
        future::join_all(fetches)
            .await
            .into_iter()
            .map(|(step_info, result)| complete_field(ctx, parameters, step_info, result))
            .unzip::<_, _, Vec<_>, Vec<_>>()
    })
    .catch_unwind()
    .await;
    let (infos, nodes) = match completed {
        Ok(completed) => completed,
        Err(panic) => {
            let error = GraphQLError::new(panic_message(&*panic), ErrorClassification::DataFetchingException)
                .with_path(parameters.path());
            strategy_ctx.on_field_values_exception(&error);
            std::panic::resume_unwind(panic)
        }
    };
    strategy_ctx.on_field_values_info(&infos);

    future::join_all(nodes.into_iter().map(|node| resolve_node(Arc::clone(ctx), node))).await
}

/// Fetches, completes and resolves one field after the other.
async fn execute_serial(
    ctx: &Arc<ExecutionContext>,
    parameters: &ExecutionStrategyParameters,
    strategy_ctx: &dyn ExecutionStrategyInstrumentationContext,
) -> Vec<ExecutionResultNode> {
    strategy_ctx.on_dispatched();
    let mut infos = Vec::with_capacity(parameters.fields().len());
    let mut nodes = Vec::with_capacity(parameters.fields().len());
    for field in parameters.fields().values() {
        let (step_info, result) = fetch_field(ctx, parameters, field).await;
        let (info, node) = complete_field(ctx, parameters, step_info, result);
        infos.push(info);
        nodes.push(resolve_node(Arc::clone(ctx), node).await);
    }
    strategy_ctx.on_field_values_info(&infos);
    nodes
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "field values panicked".to_string())
}

/// Step info of `field` selected on the object described by `parent`.
pub(super) fn field_step_info(
    ctx: &ExecutionContext,
    parent: &Arc<ExecutionStepInfo>,
    field: &MergedField,
) -> Arc<ExecutionStepInfo> {
    let parent_type = parent.ty().named_type();
    let Some(field_definition) = ctx.schema().field(parent_type, field.name()) else {
        should_never_happen(format!("field {}.{} was collected but is not defined", parent_type, field.name()))
    };
    let arguments = resolve_arguments(
        &field_definition.arguments,
        &field.single_field().arguments,
        ctx.variables(),
    );
    Arc::new(ExecutionStepInfo::for_field(
        parent,
        field.clone(),
        field_definition.clone(),
        parent_type,
        arguments,
    ))
}

/// Calls the field's data fetcher. Everything up to `get` happens before this returns.
fn fetch_field(
    ctx: &Arc<ExecutionContext>,
    parameters: &ExecutionStrategyParameters,
    field: &MergedField,
) -> BoxFuture<'static, (Arc<ExecutionStepInfo>, FetchResult)> {
    let parent_type = parameters.step_info().ty().named_type();
    let step_info = field_step_info(ctx, parameters.step_info(), field);
    let env = DataFetchingEnvironment::new(
        Arc::clone(ctx),
        parameters.source().clone(),
        parameters.local_context().cloned(),
        Arc::clone(&step_info),
    );

    let state = ctx.instrumentation_state();
    let fetch_parameters = InstrumentationFieldFetchParameters {
        execution_context: ctx,
        environment: &env,
        strategy_parameters: parameters,
    };
    let fetch_ctx = ctx.instrumentation.begin_field_fetch(&fetch_parameters, state);
    let fetcher = ctx.code_registry().fetcher(parent_type, field.name()).fetcher;
    let fetcher = ctx
        .instrumentation
        .instrument_data_fetcher(fetcher, &fetch_parameters, state);

    trace!(path = %step_info.path(), "fetching field");
    let fetch = fetcher.get(env);
    fetch_ctx.on_dispatched();

    async move {
        let result = fetch.await;
        fetch_ctx.on_completed(&result);
        (step_info, result)
    }
    .boxed()
}

/// Turns the outcome of a fetch into the field's node.
pub(super) fn complete_field(
    ctx: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    step_info: Arc<ExecutionStepInfo>,
    result: FetchResult,
) -> (FieldValueInfo, ExecutionResultNode) {
    let DataFetcherResult {
        data,
        local_context,
        errors,
    } = match result {
        Ok(result) => result,
        Err(error) => {
            let location = step_info.field().and_then(MergedField::location);
            let error = error.into_graphql_error(step_info.path(), location);
            DataFetcherResult::new(Value::Null).with_error(error)
        }
    };
    let local_context = local_context.or_else(|| parameters.local_context().cloned());
    complete_value(ctx, step_info, data, local_context, errors)
}

fn null_leaf(
    step_info: Arc<ExecutionStepInfo>,
    local_context: Option<LocalContext>,
    errors: Vec<GraphQLError>,
) -> (FieldValueInfo, ExecutionResultNode) {
    let resolved_value = ResolvedValue::builder()
        .local_context(local_context)
        .null_value(true)
        .errors(errors)
        .build();
    let non_null_error = step_info
        .is_non_null_type()
        .then(|| NonNullableFieldWasNullError::new(&step_info));
    (
        FieldValueInfo::new(CompleteValueType::Null, Vec::new()),
        ExecutionResultNode::leaf(step_info, resolved_value, non_null_error),
    )
}

fn completion_error(step_info: &ExecutionStepInfo, message: String) -> GraphQLError {
    GraphQLError::new(message, ErrorClassification::DataFetchingException)
        .with_path(step_info.path())
        .with_location(step_info.field().and_then(MergedField::location))
}

/// Completes a fetched value against the type in `step_info`.
fn complete_value(
    ctx: &ExecutionContext,
    step_info: Arc<ExecutionStepInfo>,
    value: Value,
    local_context: Option<LocalContext>,
    mut errors: Vec<GraphQLError>,
) -> (FieldValueInfo, ExecutionResultNode) {
    if value.is_null() {
        return null_leaf(step_info, local_context, errors);
    }

    let named = match step_info.ty().nullable() {
        TypeRef::Named(named) => named.clone(),
        TypeRef::List(item_type) => {
            let Value::Array(items) = value else {
                let message = format!(
                    "Can't resolve value ({}) : type mismatch error, expected type LIST",
                    step_info.path()
                );
                errors.push(completion_error(&step_info, message));
                return null_leaf(step_info, local_context, errors);
            };
            let (infos, children): (Vec<_>, Vec<_>) = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let item_info = Arc::new(step_info.for_list_item(index, (**item_type).clone()));
                    complete_value(ctx, item_info, item.clone(), local_context.clone(), Vec::new())
                })
                .unzip();
            let resolved_value = ResolvedValue::builder()
                .completed_value(Value::Array(items))
                .local_context(local_context)
                .errors(errors)
                .build();
            return (
                FieldValueInfo::new(CompleteValueType::List, infos),
                ExecutionResultNode::list(step_info, resolved_value, children),
            );
        }
        TypeRef::NonNull(_) => should_never_happen("non-null type wrapped in non-null"),
    };

    let schema = ctx.schema();
    let Some(type_def) = schema.get_type(&named) else {
        should_never_happen(format!("type {named} is not in the schema"))
    };
    let leaf = |value: Value,
                kind: CompleteValueType,
                step_info: Arc<ExecutionStepInfo>,
                local_context: Option<LocalContext>,
                errors: Vec<GraphQLError>| {
        let resolved_value = ResolvedValue::builder()
            .completed_value(value)
            .local_context(local_context)
            .errors(errors)
            .build();
        (
            FieldValueInfo::new(kind, Vec::new()),
            ExecutionResultNode::leaf(step_info, resolved_value, None),
        )
    };

    match type_def {
        TypeDef::Scalar(_) => match coerce_scalar(&named, value) {
            Ok(coerced) => leaf(coerced, CompleteValueType::Scalar, step_info, local_context, errors),
            Err(found) => {
                let message = format!(
                    "Can't serialize value ({}) : Expected type '{named}' but was '{found}'.",
                    step_info.path()
                );
                errors.push(completion_error(&step_info, message));
                null_leaf(step_info, local_context, errors)
            }
        },
        TypeDef::Enum(enum_def) => match value.as_str() {
            Some(name) if enum_def.has_value(name) => {
                leaf(value, CompleteValueType::Enum, step_info, local_context, errors)
            }
            _ => {
                let message = format!(
                    "Can't serialize value ({}) : Invalid input for enum '{named}'. Unknown value '{value}'",
                    step_info.path()
                );
                errors.push(completion_error(&step_info, message));
                null_leaf(step_info, local_context, errors)
            }
        },
        TypeDef::Object(_) => unresolved(step_info, value, local_context, errors),
        TypeDef::Interface(_) | TypeDef::Union(_) => {
            let resolved = ctx
                .code_registry()
                .type_resolver(&named)
                .resolve_type(&value, &named, schema)
                .filter(|object_type| schema.is_possible_type(&named, object_type));
            match resolved {
                Some(object_type) => {
                    let step_info = Arc::new(step_info.with_resolved_type(&object_type));
                    unresolved(step_info, value, local_context, errors)
                }
                None => {
                    let message = format!(
                        "Could not determine the exact type of '{named}' ({})",
                        step_info.path()
                    );
                    errors.push(completion_error(&step_info, message));
                    null_leaf(step_info, local_context, errors)
                }
            }
        }
        TypeDef::InputObject(_) => {
            should_never_happen(format!("input type {named} used as an output type"))
        }
    }
}

fn unresolved(
    step_info: Arc<ExecutionStepInfo>,
    value: Value,
    local_context: Option<LocalContext>,
    errors: Vec<GraphQLError>,
) -> (FieldValueInfo, ExecutionResultNode) {
    let resolved_value = ResolvedValue::builder()
        .completed_value(value)
        .local_context(local_context)
        .errors(errors)
        .build();
    (
        FieldValueInfo::new(CompleteValueType::Object, Vec::new()),
        ExecutionResultNode::unresolved_object(step_info, resolved_value),
    )
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "List",
        Value::Object(_) => "Object",
    }
}

/// Coerces a value for output as the built-in scalar `name`. Custom scalars pass through.
/// On failure returns the kind of value found.
fn coerce_scalar(name: &str, value: Value) -> Result<Value, &'static str> {
    let found = kind_of(&value);
    let coerced = match name {
        "Int" => match &value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .filter(|i| i32::try_from(*i).is_ok())
                .map(Value::from),
            Value::String(s) => s.parse::<i32>().ok().map(Value::from),
            Value::Bool(b) => Some(Value::from(i32::from(*b))),
            _ => None,
        },
        "Float" => match &value {
            Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            Value::Bool(b) => Some(Value::from(if *b { 1.0 } else { 0.0 })),
            _ => None,
        },
        "String" => match &value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        "Boolean" => match &value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => s.parse::<bool>().ok().map(Value::Bool),
            _ => None,
        },
        "ID" => match &value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::String(n.to_string())),
            _ => None,
        },
        _ => Some(value),
    };
    coerced.ok_or(found)
}

/// Executes the sub-selections of every unresolved object below `node`.
pub(super) fn resolve_node(ctx: Arc<ExecutionContext>, node: ExecutionResultNode) -> BoxFuture<'static, ExecutionResultNode> {
    match node {
        ExecutionResultNode::UnresolvedObject(_) => async move {
            let step_info = Arc::clone(node.step_info());
            let resolved_value = node.resolved_value().clone();
            let Some(field) = step_info.field() else {
                should_never_happen("unresolved object without a field")
            };
            let fields = collect_fields(
                ctx.schema(),
                ctx.document(),
                ctx.variables(),
                step_info.ty().named_type(),
                field.sub_selections(),
            );
            let parameters = ExecutionStrategyParameters::new(
                Arc::clone(&step_info),
                resolved_value.completed_value().clone(),
                resolved_value.local_context().cloned(),
                fields,
            );
            let kind = ctx.config().query_strategy;
            let children = execute_fields(ctx, parameters, kind).await;
            ExecutionResultNode::object(step_info, resolved_value, children)
        }
        .boxed(),
        ExecutionResultNode::List(_) => async move {
            let children = node.children().to_vec();
            let children =
                future::join_all(children.into_iter().map(|child| resolve_node(Arc::clone(&ctx), child))).await;
            ExecutionResultNode::list(Arc::clone(node.step_info()), node.resolved_value().clone(), children)
        }
        .boxed(),
        other => future::ready(other).boxed(),
    }
}
