//! Validating fields and their arguments before execution starts.
//!
//! Every field occurrence carrying arguments is collected by its result path, then handed
//! to a [`FieldValidation`]. Any error it reports aborts the execution before a single
//! data fetcher runs.

mod field_and_arguments;
mod simple;

pub use field_and_arguments::FieldAndArguments;
pub use simple::SimpleFieldValidation;

use super::{
    Instrumentation, InstrumentationContext, InstrumentationExecuteOperationParameters,
    InstrumentationState, SimpleInstrumentationContext,
};
use crate::error::{AbortExecution, GraphQLError};
use crate::execution::ExecutionContext;
use crate::path::ResultPath;
use crate::result::ExecutionResult;
use crate::traversal::{QueryTraverser, QueryVisitorFieldEnvironment};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// What a [`FieldValidation`] gets to look at.
pub struct FieldValidationEnvironment {
    execution_context: Arc<ExecutionContext>,
    fields: Vec<Arc<FieldAndArguments>>,
    fields_by_path: IndexMap<ResultPath, Vec<Arc<FieldAndArguments>>>,
}

impl FieldValidationEnvironment {
    pub fn execution_context(&self) -> &Arc<ExecutionContext> {
        &self.execution_context
    }

    /// Every field with arguments, in query order.
    pub fn fields(&self) -> &[Arc<FieldAndArguments>] {
        &self.fields
    }

    /// The same fields grouped by result path. Fragments can put several occurrences of a
    /// field on one path.
    pub fn fields_by_path(&self) -> &IndexMap<ResultPath, Vec<Arc<FieldAndArguments>>> {
        &self.fields_by_path
    }

    /// Creates a validation error without a location.
    pub fn mk_error(&self, message: impl Into<String>) -> GraphQLError {
        GraphQLError::validation(message)
    }

    /// Creates a validation error pointing at `field`.
    pub fn mk_error_for(
        &self,
        message: impl Into<String>,
        field: &FieldAndArguments,
    ) -> GraphQLError {
        GraphQLError::validation(message)
            .with_location(field.field().location.clone())
            .with_path(field.path())
    }
}

/// Validates the fields of an operation.
pub trait FieldValidation: Send + Sync {
    /// Returns the errors found. An empty list lets the execution proceed.
    fn validate_fields(&self, env: &FieldValidationEnvironment) -> Vec<GraphQLError>;
}

/// Collects the fields with arguments of the execution's operation and validates them.
pub fn validate_fields_and_arguments(
    validation: &dyn FieldValidation,
    execution_context: &Arc<ExecutionContext>,
) -> Vec<GraphQLError> {
    let mut fields = Vec::new();
    let mut fields_by_path: IndexMap<ResultPath, Vec<Arc<FieldAndArguments>>> = IndexMap::new();

    let traverser = QueryTraverser::for_operation(
        execution_context.schema(),
        execution_context.document(),
        execution_context.operation(),
        execution_context.variables(),
    );
    traverser.visit_pre_order(&mut |env: &Arc<QueryVisitorFieldEnvironment>| {
        if env.field.arguments.is_empty() {
            return;
        }
        let field = Arc::new(FieldAndArguments::new(Arc::clone(env)));
        fields_by_path
            .entry(field.path().clone())
            .or_default()
            .push(Arc::clone(&field));
        fields.push(field);
    });

    let env = FieldValidationEnvironment {
        execution_context: Arc::clone(execution_context),
        fields,
        fields_by_path,
    };
    validation.validate_fields(&env)
}

/// Aborts executions whose fields fail validation.
#[derive(Clone)]
pub struct FieldValidationInstrumentation {
    validation: Arc<dyn FieldValidation>,
}

impl FieldValidationInstrumentation {
    pub fn new(validation: impl FieldValidation + 'static) -> Self {
        Self {
            validation: Arc::new(validation),
        }
    }
}

impl Instrumentation for FieldValidationInstrumentation {
    fn begin_execute_operation(
        &self,
        parameters: &InstrumentationExecuteOperationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Result<Box<dyn InstrumentationContext<ExecutionResult>>, AbortExecution> {
        let errors = validate_fields_and_arguments(&*self.validation, parameters.execution_context);
        if errors.is_empty() {
            return Ok(SimpleInstrumentationContext::noop());
        }
        debug!(errors = errors.len(), "field validation failed");
        Err(AbortExecution::new(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::DataLoaderRegistry;
    use crate::document::{Document, Field, FragmentDefinition, FragmentSpread, InputValue, OperationDefinition};
    use crate::execution::test_support::execution_context;
    use crate::path::PathSegment;
    use crate::schema::{FieldDef, InputValueDef, ObjectDef, Schema, SchemaBuilder, TypeDef, TypeRef};
    use gqlexec_core::SourceLocation;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Object(
                ObjectDef::new("Query").field(
                    FieldDef::new("users", TypeRef::list(TypeRef::named("User")))
                        .argument(InputValueDef::new("first", TypeRef::named("Int")).with_default(json!(10))),
                ),
            ))
            .add_type(TypeDef::Object(
                ObjectDef::new("User")
                    .field(FieldDef::new("name", TypeRef::named("String")))
                    .field(
                        FieldDef::new("posts", TypeRef::list(TypeRef::named("String")))
                            .argument(InputValueDef::new("limit", TypeRef::named("Int"))),
                    ),
            ))
            .build()
    }

    fn context(operation: OperationDefinition, fragments: Vec<FragmentDefinition>) -> Arc<ExecutionContext> {
        let mut ctx = execution_context(schema(), operation.clone(), DataLoaderRegistry::unset());
        let document = fragments
            .into_iter()
            .fold(Document::new().with_operation(operation), Document::with_fragment);
        ctx.document = Arc::new(document);
        Arc::new(ctx)
    }

    fn users_query(limit: i64) -> OperationDefinition {
        OperationDefinition::query().with_selection(
            Field::new("users")
                .with_argument("first", 2)
                .with_selection(Field::new("name"))
                .with_selection(
                    Field::new("posts")
                        .with_argument("limit", InputValue::from(limit))
                        .with_location(SourceLocation::new(3, 5)),
                ),
        )
    }

    struct Collect;

    impl FieldValidation for Collect {
        fn validate_fields(&self, env: &FieldValidationEnvironment) -> Vec<GraphQLError> {
            env.fields()
                .iter()
                .map(|f| env.mk_error(format!("{} at {}", f.field().name, f.path())))
                .collect()
        }
    }

    #[test]
    fn test_only_fields_with_arguments_are_collected() {
        let ctx = context(users_query(5), vec![]);
        let messages: Vec<_> = validate_fields_and_arguments(&Collect, &ctx)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["users at /users", "posts at /users/posts"]);
    }

    #[test]
    fn test_repeated_fields_share_a_path() {
        let operation = OperationDefinition::query().with_selection(
            Field::new("users")
                .with_argument("first", 1)
                .with_selection(Field::new("posts").with_argument("limit", 1))
                .with_selection(FragmentSpread::new("Posts")),
        );
        let fragment = FragmentDefinition::new("Posts", "User")
            .with_selection(Field::new("posts").with_argument("limit", 2));
        let ctx = context(operation, vec![fragment]);

        let validation = SimpleFieldValidation::new().add_rule(
            ResultPath::root().segment("users").segment("posts"),
            |field, env| {
                let limit = field.argument_as::<i64>("limit")?;
                let parent = field.parent_field_and_arguments()?;
                assert_eq!(parent.argument_value("first"), Some(&json!(1)));
                (limit > 1).then(|| env.mk_error_for("limit too large", field))
            },
        );
        let errors = validate_fields_and_arguments(&validation, &ctx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "limit too large");
    }

    #[test]
    fn test_errors_carry_location_and_path() {
        let ctx = context(users_query(500), vec![]);
        let validation = SimpleFieldValidation::new().add_rule(
            ResultPath::root().segment("users").segment("posts"),
            |field, env| {
                let limit: i64 = field.argument_as("limit")?;
                (limit > 100).then(|| env.mk_error_for(format!("limit {limit} exceeds 100"), field))
            },
        );
        let errors = validate_fields_and_arguments(&validation, &ctx);
        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert_eq!(error.locations, vec![SourceLocation::new(3, 5)]);
        assert_eq!(
            error.path,
            Some(vec![PathSegment::Field("users".into()), PathSegment::Field("posts".into())])
        );
        assert_eq!(
            error.to_specification()["path"],
            json!(["users", "posts"])
        );
    }

    #[test]
    fn test_instrumentation_aborts_on_errors() {
        let ctx = context(users_query(500), vec![]);
        let parameters = InstrumentationExecuteOperationParameters {
            execution_context: &ctx,
        };

        let passing = FieldValidationInstrumentation::new(SimpleFieldValidation::new());
        assert!(passing.begin_execute_operation(&parameters, None).is_ok());

        let failing = FieldValidationInstrumentation::new(Collect);
        let aborted = match failing.begin_execute_operation(&parameters, None) {
            Err(abort) => abort,
            Ok(_) => panic!("expected the execution to abort"),
        };
        assert_eq!(aborted.into_errors().len(), 2);
    }

    #[test]
    fn test_defaults_are_applied() {
        let ctx = context(
            OperationDefinition::query().with_selection(
                Field::new("users")
                    .with_argument("unknown", 1)
                    .with_selection(Field::new("name")),
            ),
            vec![],
        );
        let validation = SimpleFieldValidation::new().add_rule(ResultPath::root().segment("users"), |field, env| {
            Some(env.mk_error(format!("first = {}", field.argument_value("first")?)))
        });
        let errors = validate_fields_and_arguments(&validation, &ctx);
        assert_eq!(errors[0].message, "first = 10");
    }
}
