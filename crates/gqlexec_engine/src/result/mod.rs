//! The result node model and execution results.
//!
//! Executing an operation produces a tree of [`ExecutionResultNode`]s. The tree is
//! immutable; [`to_execution_result`] renders it into response data, applying null
//! propagation and gathering every error.

mod node;
mod resolved_value;
pub mod traverse;
mod util;

pub use node::{ExecutionResultNode, NodeData, NonNullableFieldWasNullError};
pub use resolved_value::{ResolvedValue, ResolvedValueBuilder};
pub use traverse::{depth_first, depth_first_forest, NodeVisitor};
pub use util::{to_data, to_execution_result};

use crate::error::GraphQLError;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// The outcome of an execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// `None` when execution never started; `Some(Value::Null)` when null propagated to
    /// the top.
    pub data: Option<Value>,
    pub errors: Vec<GraphQLError>,
    pub extensions: Option<IndexMap<String, Value>>,
}

impl ExecutionResult {
    /// Creates a new result.
    pub fn new(data: Option<Value>, errors: Vec<GraphQLError>) -> Self {
        Self {
            data,
            errors,
            extensions: None,
        }
    }

    /// A result with no data.
    pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
        Self::new(None, errors)
    }

    /// Replaces the extensions.
    #[must_use]
    pub fn with_extensions(mut self, extensions: IndexMap<String, Value>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Adds one extension, keeping the existing ones.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_data_present(&self) -> bool {
        self.data.is_some()
    }

    /// The standard response map: `errors` if any, `data` if present, then `extensions`.
    pub fn to_specification(&self) -> Value {
        let mut map = Map::new();
        if !self.errors.is_empty() {
            map.insert(
                "errors".into(),
                Value::Array(self.errors.iter().map(GraphQLError::to_specification).collect()),
            );
        }
        if let Some(data) = &self.data {
            map.insert("data".into(), data.clone());
        }
        if let Some(extensions) = &self.extensions {
            map.insert(
                "extensions".into(),
                Value::Object(extensions.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            );
        }
        Value::Object(map)
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_specification().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_shape() {
        let result = ExecutionResult::new(Some(json!({"a": 1})), vec![GraphQLError::validation("bad")])
            .with_extension("cost", json!(3));

        insta::assert_json_snapshot!(result, @r###"
        {
          "errors": [
            {
              "message": "bad",
              "extensions": {
                "classification": "ValidationError"
              }
            }
          ],
          "data": {
            "a": 1
          },
          "extensions": {
            "cost": 3
          }
        }
        "###);
    }

    #[test]
    fn test_absent_data_is_omitted() {
        let result = ExecutionResult::from_errors(vec![]);
        assert!(!result.is_data_present());
        assert_eq!(result.to_specification(), json!({}));
    }
}
