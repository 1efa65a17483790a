//! Integration tests for field validation before execution.

use gqlexec_core::SourceLocation;
use gqlexec_engine::document::FragmentSpread;
use gqlexec_engine::instrumentation::field_validation::{
    FieldValidation, FieldValidationEnvironment, FieldValidationInstrumentation, SimpleFieldValidation,
};
use gqlexec_engine::schema::{FieldDef, InputValueDef, ObjectDef, TypeDef, TypeRef};
use gqlexec_engine::{
    CodeRegistry, Document, Engine, ExecutionInput, Field, FragmentDefinition,
    GraphQLError, InlineFragment, OperationDefinition, ResultPath, Schema, SchemaBuilder,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn schema() -> Schema {
    SchemaBuilder::new()
        .query_type("Query")
        .add_type(TypeDef::Object(
            ObjectDef::new("Post")
                .field(FieldDef::new("title", TypeRef::named("String")))
                .field(
                    FieldDef::new("comments", TypeRef::list(TypeRef::named("String")))
                        .argument(InputValueDef::new("first", TypeRef::named("Int")).with_default(json!(10))),
                ),
        ))
        .add_type(TypeDef::Object(
            ObjectDef::new("Query").field(
                FieldDef::new("posts", TypeRef::list(TypeRef::named("Post")))
                    .argument(InputValueDef::new("first", TypeRef::named_non_null("Int"))),
            ),
        ))
        .build()
}

fn counting_registry(fetches: &Arc<AtomicUsize>) -> CodeRegistry {
    let mut registry = CodeRegistry::new();
    let counter = Arc::clone(fetches);
    registry.register_fn("Query", "posts", move |env| {
        counter.fetch_add(1, Ordering::SeqCst);
        let first: usize = env.arguments().require("first")?;
        Ok(json!([{"title": "a", "comments": ["x"]}, {"title": "b", "comments": []}])
            .as_array()
            .map(|posts| posts.iter().take(first).cloned().collect())
            .unwrap_or_default())
    });
    registry
}

fn max_page_size(limit: i64) -> SimpleFieldValidation {
    SimpleFieldValidation::new().add_rule(ResultPath::root().segment("posts"), move |field, env| {
        let first = field.argument_as::<i64>("first")?;
        (first > limit).then(|| env.mk_error_for(format!("first must be at most {limit}, got {first}"), field))
    })
}

fn posts_query(first: i64) -> Document {
    Document::new().with_operation(
        OperationDefinition::query().with_selection(
            Field::new("posts")
                .with_argument("first", first)
                .with_location(SourceLocation::new(2, 3))
                .with_selection(Field::new("title")),
        ),
    )
}

/// Test that a failing rule aborts the execution before any field is fetched.
#[tokio::test]
async fn test_failing_rule_aborts_before_fetching() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder(schema(), counting_registry(&fetches))
        .instrumentation(FieldValidationInstrumentation::new(max_page_size(1)))
        .build();

    let result = engine.execute(ExecutionInput::new(posts_query(5))).await;

    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert_eq!(result.data, None);
    insta::assert_json_snapshot!(result, @r###"
    {
      "errors": [
        {
          "message": "first must be at most 1, got 5",
          "locations": [
            {
              "line": 2,
              "column": 3
            }
          ],
          "path": [
            "posts"
          ],
          "extensions": {
            "classification": "ValidationError"
          }
        }
      ]
    }
    "###);
}

/// Test that a passing rule lets the execution run normally.
#[tokio::test]
async fn test_passing_rule_lets_execution_run() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder(schema(), counting_registry(&fetches))
        .instrumentation(FieldValidationInstrumentation::new(max_page_size(1)))
        .build();

    let result = engine.execute(ExecutionInput::new(posts_query(1))).await;

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(result.errors.is_empty());
    assert_eq!(result.data, Some(json!({"posts": [{"title": "a"}]})));
}

/// Records every field occurrence it is shown and rejects nothing.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<(String, usize, Value)>>>,
}

impl FieldValidation for Recorder {
    fn validate_fields(&self, env: &FieldValidationEnvironment) -> Vec<GraphQLError> {
        let mut seen = self.seen.lock();
        for (path, fields) in env.fields_by_path() {
            for field in fields {
                let parent = field
                    .parent_field_and_arguments()
                    .map(|parent| parent.field().name.clone())
                    .unwrap_or_default();
                seen.push((
                    format!("{path} <- {parent}"),
                    fields.len(),
                    Value::Object(field.arguments().all().clone()),
                ));
            }
        }
        Vec::new()
    }
}

/// Test that occurrences of the same field through fragments share one path.
#[tokio::test]
async fn test_fragment_occurrences_share_a_path() {
    let recorder = Recorder::default();
    let engine = Engine::builder(schema(), counting_registry(&Arc::new(AtomicUsize::new(0))))
        .instrumentation(FieldValidationInstrumentation::new(recorder.clone()))
        .build();
    let document = Document::new()
        .with_operation(
            OperationDefinition::query().with_selection(
                Field::new("posts")
                    .with_argument("first", 2)
                    .with_selection(FragmentSpread::new("PostComments"))
                    .with_selection(
                        InlineFragment::new(Some("Post"))
                            .with_selection(Field::new("comments").with_argument("first", 1)),
                    ),
            ),
        )
        .with_fragment(
            FragmentDefinition::new("PostComments", "Post")
                .with_selection(Field::new("comments").with_argument("first", 3)),
        );

    let result = engine.execute(ExecutionInput::new(document)).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(
        *recorder.seen.lock(),
        vec![
            ("/posts <- ".to_string(), 1, json!({"first": 2})),
            ("/posts/comments <- posts".to_string(), 2, json!({"first": 3})),
            ("/posts/comments <- posts".to_string(), 2, json!({"first": 1})),
        ]
    );
}
