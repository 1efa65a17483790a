//! Subscription operations: one execution of the root field's selection per event.

use super::context::ExecutionContext;
use super::fields::collect_fields;
use super::step_info::ExecutionStepInfo;
use super::strategy::{complete_field, field_step_info, resolve_node, ExecutionStrategyParameters};
use crate::error::GraphQLError;
use crate::fetcher::{DataFetcherResult, DataFetchingEnvironment};
use crate::reactive::{CompletionStageMappingPublisher, Publisher};
use crate::result::{to_execution_result, ExecutionResult, ExecutionResultNode};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Subscribes to the event source of the operation's root field.
///
/// Every event becomes the value of the root field and is completed like a query result.
pub(super) fn subscribe_root_field(
    ctx: Arc<ExecutionContext>,
    root: Arc<ExecutionStepInfo>,
) -> Result<Arc<dyn Publisher<ExecutionResult>>, Vec<GraphQLError>> {
    let mut fields = collect_fields(
        ctx.schema(),
        ctx.document(),
        ctx.variables(),
        root.ty().named_type(),
        [&ctx.operation().selection_set],
    );
    let selected = fields.len();
    let single = if selected == 1 { fields.pop() } else { None };
    let Some((_, field)) = single else {
        return Err(vec![GraphQLError::validation(format!(
            "Subscription operations must select exactly one root field, found {selected}."
        ))
        .with_location(ctx.operation().location.clone())]);
    };

    let step_info = field_step_info(&ctx, &root, &field);
    let root_type = root.ty().named_type().to_string();
    let Some(source) = ctx.code_registry().subscription_source(&root_type, field.name()) else {
        return Err(vec![GraphQLError::validation(format!(
            "No subscription source is registered for {root_type}.{}.",
            field.name()
        ))
        .with_location(field.location())
        .with_path(step_info.path())]);
    };

    let env = DataFetchingEnvironment::new(
        Arc::clone(&ctx),
        ctx.root_value().clone(),
        None,
        Arc::clone(&step_info),
    );
    let events = source
        .subscribe(env)
        .map_err(|error| vec![error.into_graphql_error(step_info.path(), field.location())])?;
    debug!(field = %field.result_key(), "subscribed to event source");

    let parameters = Arc::new(ExecutionStrategyParameters::new(
        root,
        ctx.root_value().clone(),
        None,
        [(field.result_key().to_string(), field.clone())].into_iter().collect(),
    ));
    let publisher = CompletionStageMappingPublisher::new(events, move |event: Value| {
        let ctx = Arc::clone(&ctx);
        let (_, node) = complete_field(
            &ctx,
            &parameters,
            Arc::clone(&step_info),
            Ok(DataFetcherResult::new(event)),
        );
        async move {
            let node = resolve_node(ctx, node).await;
            let root = ExecutionResultNode::root(vec![node], Vec::new());
            Ok(to_execution_result(&root))
        }
        .boxed()
    });
    Ok(Arc::new(publisher))
}
