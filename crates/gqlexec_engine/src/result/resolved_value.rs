use crate::error::GraphQLError;
use crate::fetcher::LocalContext;
use serde_json::Value;
use std::fmt;

/// The completed value of one field, before it is placed in the result tree.
#[derive(Clone, Default)]
pub struct ResolvedValue {
    completed_value: Value,
    local_context: Option<LocalContext>,
    null_value: bool,
    errors: Vec<GraphQLError>,
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedValue")
            .field("completed_value", &self.completed_value)
            .field("has_local_context", &self.local_context.is_some())
            .field("null_value", &self.null_value)
            .field("errors", &self.errors)
            .finish()
    }
}

impl ResolvedValue {
    pub fn builder() -> ResolvedValueBuilder {
        ResolvedValueBuilder::default()
    }

    /// A value that is explicitly null.
    pub fn null() -> Self {
        Self::builder().null_value(true).build()
    }

    /// Copies this value, lets `f` override fields, and builds the result.
    #[must_use]
    pub fn transform(&self, f: impl FnOnce(ResolvedValueBuilder) -> ResolvedValueBuilder) -> Self {
        f(ResolvedValueBuilder {
            value: self.clone(),
        })
        .build()
    }

    pub fn completed_value(&self) -> &Value {
        &self.completed_value
    }

    pub fn local_context(&self) -> Option<&LocalContext> {
        self.local_context.as_ref()
    }

    /// Returns true if the value is explicitly null, as opposed to merely absent.
    pub fn is_null_value(&self) -> bool {
        self.null_value
    }

    pub fn errors(&self) -> &[GraphQLError] {
        &self.errors
    }
}

/// Builds a [`ResolvedValue`].
#[derive(Default)]
pub struct ResolvedValueBuilder {
    value: ResolvedValue,
}

impl ResolvedValueBuilder {
    #[must_use]
    pub fn completed_value(mut self, value: Value) -> Self {
        self.value.completed_value = value;
        self
    }

    #[must_use]
    pub fn local_context(mut self, local_context: Option<LocalContext>) -> Self {
        self.value.local_context = local_context;
        self
    }

    #[must_use]
    pub fn null_value(mut self, null_value: bool) -> Self {
        self.value.null_value = null_value;
        self
    }

    #[must_use]
    pub fn errors(mut self, errors: Vec<GraphQLError>) -> Self {
        self.value.errors = errors;
        self
    }

    #[must_use]
    pub fn add_error(mut self, error: GraphQLError) -> Self {
        self.value.errors.push(error);
        self
    }

    pub fn build(self) -> ResolvedValue {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_transform_copies_then_overrides() {
        let original = ResolvedValue::builder()
            .completed_value(json!("a"))
            .local_context(Some(Arc::new(7u32)))
            .add_error(GraphQLError::validation("x"))
            .build();

        let changed = original.transform(|b| b.completed_value(json!("b")));

        assert_eq!(changed.completed_value(), &json!("b"));
        assert_eq!(changed.errors().len(), 1);
        assert_eq!(
            changed.local_context().and_then(|c| c.downcast_ref::<u32>()),
            Some(&7)
        );
        assert_eq!(original.completed_value(), &json!("a"));
    }

    #[test]
    fn test_null_is_distinct_from_absent() {
        assert!(ResolvedValue::null().is_null_value());
        let absent = ResolvedValue::default();
        assert!(!absent.is_null_value());
        assert_eq!(absent.completed_value(), &Value::Null);
    }
}
