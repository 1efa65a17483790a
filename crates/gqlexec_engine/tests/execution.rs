//! Integration tests for executing operations through the engine.

use gqlexec_engine::document::{FragmentSpread, InputValue, VariableDefinition};
use gqlexec_engine::schema::{FieldDef, InputValueDef, ObjectDef, TypeDef, TypeRef};
use gqlexec_engine::{
    CodeRegistry, Document, Engine, ErrorClassification, ExecutionConfig, ExecutionInput,
    ExecutionStrategyKind, Field, FieldError, FragmentDefinition, OperationDefinition, Schema,
    SchemaBuilder,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn schema() -> Schema {
    SchemaBuilder::new()
        .query_type("Query")
        .mutation_type("Mutation")
        .add_type(TypeDef::Object(
            ObjectDef::new("User")
                .field(FieldDef::new("id", TypeRef::named_non_null("ID")))
                .field(FieldDef::new("name", TypeRef::named_non_null("String")))
                .field(FieldDef::new("age", TypeRef::named("Int"))),
        ))
        .add_type(TypeDef::Object(
            ObjectDef::new("Query")
                .field(FieldDef::new("users", TypeRef::list(TypeRef::named("User"))))
                .field(
                    FieldDef::new("user", TypeRef::named("User"))
                        .argument(InputValueDef::new("id", TypeRef::named_non_null("ID"))),
                )
                .field(FieldDef::new("greeting", TypeRef::named("String"))),
        ))
        .add_type(TypeDef::Object(
            ObjectDef::new("Mutation").field(
                FieldDef::new("push", TypeRef::named_non_null("Int"))
                    .argument(InputValueDef::new("value", TypeRef::named_non_null("Int"))),
            ),
        ))
        .build()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn users() -> Value {
    json!([
        {"id": "1", "name": "Alice", "age": 31},
        {"id": "2", "name": null, "age": 27},
        {"id": "3", "name": "Carol"}
    ])
}

/// Test that a simple query resolves against the root value through property fetchers.
#[tokio::test]
async fn test_query_with_default_fetchers() {
    init_tracing();
    let engine = Engine::builder(schema(), CodeRegistry::new()).build();
    let document = Document::new().with_operation(
        OperationDefinition::query()
            .with_selection(Field::new("greeting"))
            .with_selection(Field::new("hello").with_alias("again")),
    );
    let input = ExecutionInput::new(document).with_root_value(json!({"greeting": "hi"}));

    let result = engine.execute(input).await;

    // `hello` is not defined on Query and is left out of the response
    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(json!({"greeting": "hi"})));
}

/// Test that a null in a non-null field nulls the nearest nullable parent.
#[tokio::test]
async fn test_null_propagates_to_nullable_parent() {
    init_tracing();
    let engine = Engine::builder(schema(), CodeRegistry::new()).build();
    let document = Document::new().with_operation(
        OperationDefinition::query().with_selection(
            Field::new("users")
                .with_selection(Field::new("id"))
                .with_selection(Field::new("name")),
        ),
    );
    let input = ExecutionInput::new(document).with_root_value(json!({"users": users()}));

    let result = engine.execute(input).await;

    assert_eq!(
        result.data,
        Some(json!({"users": [
            {"id": "1", "name": "Alice"},
            null,
            {"id": "3", "name": "Carol"}
        ]}))
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].classification,
        ErrorClassification::NullValueInNonNullableField
    );
    assert_eq!(
        result.errors[0].to_specification()["path"],
        json!(["users", 1, "name"])
    );
}

/// Test that fetcher errors are reported with the field path and the field nulled.
#[tokio::test]
async fn test_fetcher_errors_are_reported() {
    let mut registry = CodeRegistry::new();
    registry.register_fn("Query", "user", |env| {
        let id: String = env.arguments().require("id")?;
        Err(FieldError::new(format!("no user {id}")).with_code("NOT_FOUND"))
    });
    let engine = Engine::builder(schema(), registry).build();
    let document = Document::new().with_operation(
        OperationDefinition::query()
            .with_selection(Field::new("user").with_argument("id", "9").with_selection(Field::new("id")))
            .with_selection(Field::new("greeting")),
    );
    let input = ExecutionInput::new(document).with_root_value(json!({"greeting": "hi"}));

    let result = engine.execute(input).await.to_specification();

    assert_eq!(result["data"], json!({"user": null, "greeting": "hi"}));
    assert_eq!(
        result["errors"][0]["message"],
        json!("Exception while fetching data (/user) : no user 9")
    );
    assert_eq!(result["errors"][0]["path"], json!(["user"]));
    assert_eq!(result["errors"][0]["extensions"]["code"], json!("NOT_FOUND"));
}

/// Test that fragments and variables select and parameterize fields.
#[tokio::test]
async fn test_fragments_and_variables() {
    let mut registry = CodeRegistry::new();
    registry.register_fn("Query", "user", |env| {
        let id: String = env.arguments().require("id")?;
        Ok(users()
            .as_array()
            .and_then(|users| users.iter().find(|user| user["id"] == json!(id)))
            .cloned()
            .unwrap_or(Value::Null))
    });
    let engine = Engine::builder(schema(), registry).build();
    let document = Document::new()
        .with_operation(
            OperationDefinition::query()
                .with_name("UserById")
                .with_variable(VariableDefinition::new("id", TypeRef::named_non_null("ID")))
                .with_selection(
                    Field::new("user")
                        .with_argument("id", InputValue::variable("id"))
                        .with_selection(FragmentSpread::new("UserFields")),
                ),
        )
        .with_fragment(
            FragmentDefinition::new("UserFields", "User")
                .with_selection(Field::new("name"))
                .with_selection(Field::new("age")),
        );
    let mut variables = serde_json::Map::new();
    variables.insert("id".into(), json!("1"));
    let input = ExecutionInput::new(document)
        .with_operation_name("UserById")
        .with_variables(variables);

    let result = engine.execute(input).await;

    assert_eq!(result.data, Some(json!({"user": {"name": "Alice", "age": 31}})));
}

/// Test that missing non-null variables fail before execution.
#[tokio::test]
async fn test_missing_variable_fails_before_execution() {
    let engine = Engine::builder(schema(), CodeRegistry::new()).build();
    let document = Document::new().with_operation(
        OperationDefinition::query()
            .with_variable(VariableDefinition::new("id", TypeRef::named_non_null("ID")))
            .with_selection(
                Field::new("user")
                    .with_argument("id", InputValue::variable("id"))
                    .with_selection(Field::new("name")),
            ),
    );

    let result = engine.execute(ExecutionInput::new(document)).await;

    assert!(!result.is_data_present());
    assert_eq!(result.errors.len(), 1);
}

/// Test that mutation fields run one after another in document order.
#[tokio::test]
async fn test_mutation_fields_run_serially() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CodeRegistry::new();
    let pushed = Arc::clone(&log);
    registry.register_async("Mutation", "push", move |env| {
        let log = Arc::clone(&pushed);
        async move {
            let value: i64 = env.arguments().require("value")?;
            // later fields finish sooner, so only serial execution keeps the order
            tokio::time::sleep(Duration::from_millis(30 - 10 * value as u64)).await;
            log.lock().push(value);
            Ok(json!(value))
        }
    });
    let engine = Engine::builder(schema(), registry).build();
    let document = Document::new().with_operation(
        OperationDefinition::mutation()
            .with_selection(Field::new("push").with_alias("first").with_argument("value", 0))
            .with_selection(Field::new("push").with_alias("second").with_argument("value", 1))
            .with_selection(Field::new("push").with_alias("third").with_argument("value", 2)),
    );

    let result = engine.execute(ExecutionInput::new(document)).await;

    assert_eq!(result.data, Some(json!({"first": 0, "second": 1, "third": 2})));
    assert_eq!(*log.lock(), vec![0, 1, 2]);
}

/// Test that queries run concurrently under the async strategy.
#[tokio::test]
async fn test_query_fields_run_concurrently() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = CodeRegistry::new();
    let seen = Arc::clone(&log);
    registry.register_async("Query", "greeting", move |env| {
        let log = Arc::clone(&seen);
        async move {
            let delay = match env.step_info().result_key() {
                Some("slow") => 40,
                _ => 5,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            log.lock().push(delay);
            Ok(json!(delay.to_string()))
        }
    });
    let engine = Engine::builder(schema(), registry)
        .config(ExecutionConfig::default().with_query_strategy(ExecutionStrategyKind::Async))
        .build();
    let document = Document::new().with_operation(
        OperationDefinition::query()
            .with_selection(Field::new("greeting").with_alias("slow"))
            .with_selection(Field::new("greeting").with_alias("fast")),
    );

    let result = engine.execute(ExecutionInput::new(document)).await;

    assert_eq!(result.data, Some(json!({"slow": "40", "fast": "5"})));
    assert_eq!(*log.lock(), vec![5, 40]);
}

/// Test that asking for an operation the schema has no root type for is rejected.
#[tokio::test]
async fn test_unsupported_operation_type() {
    let schema = SchemaBuilder::new()
        .query_type("Query")
        .add_type(TypeDef::Object(
            ObjectDef::new("Query").field(FieldDef::new("greeting", TypeRef::named("String"))),
        ))
        .build();
    let engine = Engine::builder(schema, CodeRegistry::new()).build();
    let document = Document::new()
        .with_operation(OperationDefinition::mutation().with_selection(Field::new("greeting")));

    let result = engine.execute(ExecutionInput::new(document)).await;

    assert_eq!(result.data, None);
    assert_eq!(
        result.errors[0].message,
        "Schema is not configured for mutation operations."
    );
    assert_eq!(
        result.errors[0].classification,
        ErrorClassification::OperationNotSupported
    );
}
