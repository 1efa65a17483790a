//! Errors reported in execution results.

use crate::path::{PathSegment, ResultPath};
use gqlexec_core::{InvalidSyntaxError, SourceLocation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// The kind of a [`GraphQLError`], surfaced as `extensions.classification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClassification {
    ValidationError,
    InvalidSyntax,
    DataFetchingException,
    NullValueInNonNullableField,
    OperationNotSupported,
    ExecutionAborted,
}

/// An error in the standard GraphQL response shape.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct GraphQLError {
    pub message: String,
    pub locations: Vec<SourceLocation>,
    /// Literal path segments, ready for serialization.
    pub path: Option<Vec<PathSegment>>,
    pub extensions: IndexMap<String, Value>,
    pub classification: ErrorClassification,
}

impl GraphQLError {
    /// Creates a new error.
    pub fn new(message: impl Into<String>, classification: ErrorClassification) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: IndexMap::new(),
            classification,
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message, ErrorClassification::ValidationError)
    }

    /// Adds a source location, if there is one.
    #[must_use]
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        if let Some(location) = location {
            self.locations.push(location);
        }
        self
    }

    /// Sets the result path.
    #[must_use]
    pub fn with_path(mut self, path: &ResultPath) -> Self {
        self.path = Some(path.to_list());
        self
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Returns the error in the serialized response shape.
    pub fn to_specification(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("message".into(), Value::String(self.message.clone()));
        if !self.locations.is_empty() {
            let locations = self
                .locations
                .iter()
                .map(|l| serde_json::json!({"line": l.line, "column": l.column}))
                .collect();
            map.insert("locations".into(), Value::Array(locations));
        }
        if let Some(path) = &self.path {
            map.insert(
                "path".into(),
                serde_json::to_value(path).unwrap_or(Value::Null),
            );
        }
        let mut extensions: serde_json::Map<String, Value> = self
            .extensions
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        extensions.insert(
            "classification".into(),
            serde_json::to_value(self.classification).unwrap_or(Value::Null),
        );
        map.insert("extensions".into(), Value::Object(extensions));
        Value::Object(map)
    }
}

impl Serialize for GraphQLError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_specification().serialize(serializer)
    }
}

impl From<InvalidSyntaxError> for GraphQLError {
    fn from(error: InvalidSyntaxError) -> Self {
        let location = error.location.clone();
        Self::new(error.to_string(), ErrorClassification::InvalidSyntax).with_location(Some(location))
    }
}

/// An error returned by a data fetcher.
///
/// The engine turns it into a [`GraphQLError`] carrying the field's location and path.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// Error extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", Value::String(code.into()))
    }

    /// Converts into a data fetching error for the field at `path`.
    pub fn into_graphql_error(
        self,
        path: &ResultPath,
        location: Option<SourceLocation>,
    ) -> GraphQLError {
        let mut error = GraphQLError::new(
            format!("Exception while fetching data ({path}) : {}", self.message),
            ErrorClassification::DataFetchingException,
        )
        .with_path(path)
        .with_location(location);
        if let Some(extensions) = self.extensions {
            error.extensions.extend(extensions);
        }
        error
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Stops an execution before any field is fetched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Execution aborted")]
pub struct AbortExecution {
    pub errors: Vec<GraphQLError>,
}

impl AbortExecution {
    /// Creates an abort carrying the errors that caused it.
    pub fn new(errors: Vec<GraphQLError>) -> Self {
        Self { errors }
    }

    /// The errors to report for the aborted execution.
    pub fn into_errors(self) -> Vec<GraphQLError> {
        if self.errors.is_empty() {
            vec![GraphQLError::new(
                "Execution aborted",
                ErrorClassification::ExecutionAborted,
            )]
        } else {
            self.errors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_conversion() {
        let path = ResultPath::root().segment("user").segment("name");
        let error = FieldError::new("boom")
            .with_code("NOT_FOUND")
            .into_graphql_error(&path, Some(SourceLocation::new(2, 5)));

        insta::assert_json_snapshot!(error, @r###"
        {
          "message": "Exception while fetching data (/user/name) : boom",
          "locations": [
            {
              "line": 2,
              "column": 5
            }
          ],
          "path": [
            "user",
            "name"
          ],
          "extensions": {
            "code": "NOT_FOUND",
            "classification": "DataFetchingException"
          }
        }
        "###);
    }

    #[test]
    fn test_minimal_response_map() {
        let error = GraphQLError::validation("bad");
        assert_eq!(
            error.to_specification(),
            serde_json::json!({"message": "bad", "extensions": {"classification": "ValidationError"}})
        );
    }

    #[test]
    fn test_abort_without_errors_reports_itself() {
        let errors = AbortExecution::new(Vec::new()).into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].classification, ErrorClassification::ExecutionAborted);
    }
}
