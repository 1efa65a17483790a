//! Introspection: the `__Schema` family of types, the meta fields and their fetchers.
//!
//! A `__Type` value is a small JSON object. Named types carry only their `name`; list and
//! non-null wrappers carry `kind` and `ofType`. The `__Type` fetchers look everything else
//! up in the schema, so nested introspection selections resolve to any depth.

use crate::error::FieldError;
use crate::fetcher::{CodeRegistry, DataFetcher, DataFetchingEnvironment, FnDataFetcher};
use crate::schema::{
    DirectiveDefinition, EnumDef, FieldDef, InputValueDef, ObjectDef, Schema, TypeDef, TypeRef,
};
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};

pub const TYPENAME_FIELD: &str = "__typename";
pub const SCHEMA_FIELD: &str = "__schema";
pub const TYPE_FIELD: &str = "__type";

pub static TYPENAME_META_FIELD: LazyLock<FieldDef> = LazyLock::new(|| {
    FieldDef::new(TYPENAME_FIELD, TypeRef::named_non_null("String"))
        .with_description("The name of the current Object type at runtime.")
});

pub static SCHEMA_META_FIELD: LazyLock<FieldDef> = LazyLock::new(|| {
    FieldDef::new(SCHEMA_FIELD, TypeRef::named_non_null("__Schema"))
        .with_description("Access the current type schema of this server.")
});

pub static TYPE_META_FIELD: LazyLock<FieldDef> = LazyLock::new(|| {
    FieldDef::new(TYPE_FIELD, TypeRef::named("__Type"))
        .with_description("Request the type information of a single type.")
        .argument(InputValueDef::new("name", TypeRef::named_non_null("String")))
});

fn list_of(name: &str) -> TypeRef {
    TypeRef::list(TypeRef::named_non_null(name))
}

fn include_deprecated() -> InputValueDef {
    InputValueDef::new("includeDeprecated", TypeRef::named("Boolean")).with_default(Value::Bool(false))
}

/// The types every schema carries for introspection.
pub static INTROSPECTION_TYPES: LazyLock<Vec<TypeDef>> = LazyLock::new(|| {
    vec![
        TypeDef::Object(
            ObjectDef::new("__Schema")
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new("types", TypeRef::non_null(list_of("__Type"))))
                .field(FieldDef::new("queryType", TypeRef::named_non_null("__Type")))
                .field(FieldDef::new("mutationType", TypeRef::named("__Type")))
                .field(FieldDef::new("subscriptionType", TypeRef::named("__Type")))
                .field(FieldDef::new("directives", TypeRef::non_null(list_of("__Directive")))),
        ),
        TypeDef::Object(
            ObjectDef::new("__Type")
                .field(FieldDef::new("kind", TypeRef::named_non_null("__TypeKind")))
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new("fields", list_of("__Field")).argument(include_deprecated()))
                .field(FieldDef::new("interfaces", list_of("__Type")))
                .field(FieldDef::new("possibleTypes", list_of("__Type")))
                .field(FieldDef::new("enumValues", list_of("__EnumValue")).argument(include_deprecated()))
                .field(FieldDef::new("inputFields", list_of("__InputValue")))
                .field(FieldDef::new("ofType", TypeRef::named("__Type")))
                .field(FieldDef::new("specifiedByURL", TypeRef::named("String"))),
        ),
        TypeDef::Object(
            ObjectDef::new("__Field")
                .field(FieldDef::new("name", TypeRef::named_non_null("String")))
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new("args", TypeRef::non_null(list_of("__InputValue"))))
                .field(FieldDef::new("type", TypeRef::named_non_null("__Type")))
                .field(FieldDef::new("isDeprecated", TypeRef::named_non_null("Boolean")))
                .field(FieldDef::new("deprecationReason", TypeRef::named("String"))),
        ),
        TypeDef::Object(
            ObjectDef::new("__InputValue")
                .field(FieldDef::new("name", TypeRef::named_non_null("String")))
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new("type", TypeRef::named_non_null("__Type")))
                .field(FieldDef::new("defaultValue", TypeRef::named("String"))),
        ),
        TypeDef::Object(
            ObjectDef::new("__EnumValue")
                .field(FieldDef::new("name", TypeRef::named_non_null("String")))
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new("isDeprecated", TypeRef::named_non_null("Boolean")))
                .field(FieldDef::new("deprecationReason", TypeRef::named("String"))),
        ),
        TypeDef::Object(
            ObjectDef::new("__Directive")
                .field(FieldDef::new("name", TypeRef::named_non_null("String")))
                .field(FieldDef::new("description", TypeRef::named("String")))
                .field(FieldDef::new(
                    "locations",
                    TypeRef::non_null(list_of("__DirectiveLocation")),
                ))
                .field(FieldDef::new("args", TypeRef::non_null(list_of("__InputValue"))))
                .field(FieldDef::new("isRepeatable", TypeRef::named_non_null("Boolean"))),
        ),
        TypeDef::Enum(EnumDef::new(
            "__TypeKind",
            &["SCALAR", "OBJECT", "INTERFACE", "UNION", "ENUM", "INPUT_OBJECT", "LIST", "NON_NULL"],
        )),
        TypeDef::Enum(EnumDef::new(
            "__DirectiveLocation",
            &[
                "QUERY",
                "MUTATION",
                "SUBSCRIPTION",
                "FIELD",
                "FRAGMENT_DEFINITION",
                "FRAGMENT_SPREAD",
                "INLINE_FRAGMENT",
                "VARIABLE_DEFINITION",
                "SCHEMA",
                "SCALAR",
                "OBJECT",
                "FIELD_DEFINITION",
                "ARGUMENT_DEFINITION",
                "INTERFACE",
                "UNION",
                "ENUM",
                "ENUM_VALUE",
                "INPUT_OBJECT",
                "INPUT_FIELD_DEFINITION",
            ],
        )),
    ]
});

/// The `__Type` value of a type reference.
fn type_ref_value(ty: &TypeRef) -> Value {
    match ty {
        TypeRef::Named(name) => json!({ "name": name }),
        TypeRef::List(inner) => json!({ "kind": "LIST", "name": null, "ofType": type_ref_value(inner) }),
        TypeRef::NonNull(inner) => {
            json!({ "kind": "NON_NULL", "name": null, "ofType": type_ref_value(inner) })
        }
    }
}

fn named_type_value(name: Option<&str>) -> Value {
    name.map_or(Value::Null, |name| json!({ "name": name }))
}

/// Prints a default value as a GraphQL literal.
fn print_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(print_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(fields) => {
            let fields: Vec<_> = fields
                .iter()
                .map(|(name, value)| format!("{name}: {}", print_literal(value)))
                .collect();
            format!("{{{}}}", fields.join(", "))
        }
        other => other.to_string(),
    }
}

fn input_value(definition: &InputValueDef) -> Value {
    json!({
        "name": definition.name,
        "description": definition.description,
        "type": type_ref_value(&definition.ty),
        "defaultValue": definition.default_value.as_ref().map(print_literal),
    })
}

fn field_value(definition: &FieldDef) -> Value {
    json!({
        "name": definition.name,
        "description": definition.description,
        "args": definition.arguments.values().map(input_value).collect::<Vec<_>>(),
        "type": type_ref_value(&definition.ty),
        "isDeprecated": definition.deprecated,
        "deprecationReason": definition.deprecation_reason,
    })
}

fn directive_value(directive: &DirectiveDefinition) -> Value {
    json!({
        "name": directive.name,
        "description": directive.description,
        "locations": directive.locations,
        "args": directive.arguments.values().map(input_value).collect::<Vec<_>>(),
        "isRepeatable": directive.repeatable,
    })
}

fn schema_value(schema: &Schema) -> Value {
    json!({
        "description": schema.description,
        "types": schema.types().map(|(name, _)| json!({ "name": name })).collect::<Vec<_>>(),
        "queryType": named_type_value(schema.query_type.as_deref()),
        "mutationType": named_type_value(schema.mutation_type.as_deref()),
        "subscriptionType": named_type_value(schema.subscription_type.as_deref()),
        "directives": schema.directives.values().map(directive_value).collect::<Vec<_>>(),
    })
}

/// The schema definition of the named `__Type` being fetched. `None` for wrappers.
fn source_type(env: &DataFetchingEnvironment) -> Option<&TypeDef> {
    let name = env.source().get("name")?.as_str()?;
    env.schema().get_type(name)
}

fn wants_deprecated(env: &DataFetchingEnvironment) -> bool {
    env.argument::<bool>("includeDeprecated").unwrap_or(false)
}

fn type_kind(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    if let Some(kind) = env.source().get("kind").filter(|kind| kind.is_string()) {
        return Ok(kind.clone());
    }
    source_type(env)
        .map(|type_def| Value::from(type_def.kind()))
        .ok_or_else(|| FieldError::new(format!("Unknown type {}", env.source())))
}

fn type_fields(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    let Some(fields) = source_type(env).and_then(TypeDef::fields) else {
        return Ok(Value::Null);
    };
    let include_deprecated = wants_deprecated(env);
    Ok(fields
        .values()
        .filter(|field| !field.name.starts_with("__"))
        .filter(|field| include_deprecated || !field.deprecated)
        .map(field_value)
        .collect())
}

fn type_interfaces(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    let interfaces = match source_type(env) {
        Some(TypeDef::Object(object)) => &object.implements,
        Some(TypeDef::Interface(interface)) => &interface.implements,
        _ => return Ok(Value::Null),
    };
    Ok(interfaces.iter().map(|name| json!({ "name": name })).collect())
}

fn type_possible_types(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    match source_type(env) {
        Some(type_def) if type_def.is_abstract() => Ok(env
            .schema()
            .possible_types(type_def.name())
            .into_iter()
            .map(|name| json!({ "name": name }))
            .collect()),
        _ => Ok(Value::Null),
    }
}

fn type_enum_values(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    let Some(TypeDef::Enum(enum_def)) = source_type(env) else {
        return Ok(Value::Null);
    };
    let include_deprecated = wants_deprecated(env);
    Ok(enum_def
        .values
        .iter()
        .filter(|value| include_deprecated || !value.deprecated)
        .map(|value| {
            json!({
                "name": value.name,
                "description": value.description,
                "isDeprecated": value.deprecated,
                "deprecationReason": value.deprecation_reason,
            })
        })
        .collect())
}

fn type_input_fields(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    let Some(TypeDef::InputObject(input)) = source_type(env) else {
        return Ok(Value::Null);
    };
    Ok(input.fields.values().map(input_value).collect())
}

fn type_description(env: &DataFetchingEnvironment) -> Result<Value, FieldError> {
    Ok(source_type(env)
        .and_then(TypeDef::description)
        .map_or(Value::Null, Value::from))
}

/// Registers the fetchers of the `__Type` fields that read the schema.
///
/// Every other introspection field reads a property of its source value.
pub fn register_fetchers(registry: &mut CodeRegistry) {
    registry
        .register_fn("__Type", "kind", type_kind)
        .register_fn("__Type", "description", type_description)
        .register_fn("__Type", "fields", type_fields)
        .register_fn("__Type", "interfaces", type_interfaces)
        .register_fn("__Type", "possibleTypes", type_possible_types)
        .register_fn("__Type", "enumValues", type_enum_values)
        .register_fn("__Type", "inputFields", type_input_fields);
}

static TYPENAME_FETCHER: LazyLock<Arc<dyn DataFetcher>> = LazyLock::new(|| {
    Arc::new(FnDataFetcher::new(|env| {
        Ok(env.parent_type().map_or(Value::Null, Value::from))
    }))
});

static SCHEMA_FETCHER: LazyLock<Arc<dyn DataFetcher>> =
    LazyLock::new(|| Arc::new(FnDataFetcher::new(|env| Ok(schema_value(env.schema())))));

static TYPE_FETCHER: LazyLock<Arc<dyn DataFetcher>> = LazyLock::new(|| {
    Arc::new(FnDataFetcher::new(|env| {
        let name: String = env.arguments().require("name")?;
        Ok(env
            .schema()
            .get_type(&name)
            .map_or(Value::Null, |_| json!({ "name": name })))
    }))
});

/// The fetcher of a meta field, if `field_name` names one.
pub fn meta_field_fetcher(field_name: &str) -> Option<Arc<dyn DataFetcher>> {
    let fetcher = match field_name {
        TYPENAME_FIELD => &TYPENAME_FETCHER,
        SCHEMA_FIELD => &SCHEMA_FETCHER,
        TYPE_FIELD => &TYPE_FETCHER,
        _ => return None,
    };
    Some(LazyLock::force(fetcher).clone())
}
