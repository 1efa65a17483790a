//! Variable and argument values.

use crate::document::{Directive, InputValue, OperationDefinition};
use crate::error::GraphQLError;
use crate::schema::InputValueDef;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Coerced variables of an operation.
pub type Variables = Map<String, Value>;

/// Resolved field arguments, after variable substitution and defaulting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    args: Map<String, Value>,
}

/// An argument could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("Missing required argument: {0}")]
    Missing(String),
    #[error("Failed to parse argument '{0}': {1}")]
    Parse(String, String),
}

impl Arguments {
    /// Creates empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates arguments from a list of (name, value) pairs.
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        Self {
            args: pairs.into_iter().collect(),
        }
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type. `null` reads as absent.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        self.args
            .get(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone())
                    .map_err(|e| ArgumentError::Parse(name.to_string(), e.to_string()))
            })
    }

    /// Deserializes every argument into one value.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.args.clone()))
    }

    pub fn all(&self) -> &Map<String, Value> {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

impl From<ArgumentError> for crate::error::FieldError {
    fn from(error: ArgumentError) -> Self {
        Self::new(error.to_string())
    }
}

/// Converts a literal to JSON, substituting variables.
///
/// Unknown variables become `null`.
pub fn value_from_ast(value: &InputValue, variables: &Variables) -> Value {
    match value {
        InputValue::Null => Value::Null,
        InputValue::Int(i) => Value::from(*i),
        InputValue::Float(f) => Value::from(*f),
        InputValue::String(s) | InputValue::Enum(s) => Value::String(s.clone()),
        InputValue::Boolean(b) => Value::Bool(*b),
        InputValue::List(items) => {
            Value::Array(items.iter().map(|v| value_from_ast(v, variables)).collect())
        }
        InputValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_from_ast(v, variables)))
                .collect(),
        ),
        InputValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
    }
}

/// Resolves the arguments of a field against their definitions.
///
/// Arguments that are neither provided nor defaulted are omitted. A variable that was not
/// supplied counts as not provided.
pub fn resolve_arguments(
    definitions: &IndexMap<String, InputValueDef>,
    provided: &IndexMap<String, InputValue>,
    variables: &Variables,
) -> Arguments {
    let mut args = Map::new();
    for (name, definition) in definitions {
        let value = match provided.get(name) {
            Some(InputValue::Variable(var)) if !variables.contains_key(var) => None,
            Some(literal) => Some(value_from_ast(literal, variables)),
            None => None,
        };
        match value.or_else(|| definition.default_value.clone()) {
            Some(value) => {
                args.insert(name.clone(), value);
            }
            None => continue,
        }
    }
    Arguments { args }
}

/// Applies variable defaults and checks that non-null variables were provided.
pub fn coerce_variables(
    operation: &OperationDefinition,
    provided: &Variables,
) -> Result<Variables, GraphQLError> {
    let mut coerced = Map::new();
    for definition in &operation.variable_definitions {
        let name = &definition.name;
        match provided.get(name) {
            Some(Value::Null) if definition.ty.is_non_null() => {
                return Err(GraphQLError::validation(format!(
                    "Variable '{name}' of non-null type '{}' must not be null.",
                    definition.ty
                )));
            }
            Some(value) => {
                coerced.insert(name.clone(), value.clone());
            }
            None => match &definition.default_value {
                Some(default) => {
                    coerced.insert(name.clone(), value_from_ast(default, &Map::new()));
                }
                None if definition.ty.is_non_null() => {
                    return Err(GraphQLError::validation(format!(
                        "Variable '{name}' of required type '{}' was not provided.",
                        definition.ty
                    )));
                }
                None => {}
            },
        }
    }
    Ok(coerced)
}

/// Evaluates `@skip` and `@include`.
pub fn should_include(directives: &[Directive], variables: &Variables) -> bool {
    let condition = |name: &str| {
        directives
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.arguments.get("if"))
            .map(|v| value_from_ast(v, variables) == Value::Bool(true))
    };
    if condition("skip") == Some(true) {
        return false;
    }
    condition("include").unwrap_or(true)
}
