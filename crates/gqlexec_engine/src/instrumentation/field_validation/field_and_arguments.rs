use crate::document::Field;
use crate::path::ResultPath;
use crate::schema::FieldDef;
use crate::traversal::QueryVisitorFieldEnvironment;
use crate::values::Arguments;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// A field occurrence of the query together with its resolved arguments.
#[derive(Debug, Clone)]
pub struct FieldAndArguments {
    env: Arc<QueryVisitorFieldEnvironment>,
    parent: Option<Arc<FieldAndArguments>>,
    path: ResultPath,
}

impl FieldAndArguments {
    /// Creates the record for `env`, including the chain of its enclosing fields.
    pub fn new(env: Arc<QueryVisitorFieldEnvironment>) -> Self {
        let parent = env
            .parent_environment
            .as_ref()
            .map(|parent| Arc::new(Self::new(Arc::clone(parent))));
        let path = parent
            .as_ref()
            .map_or_else(ResultPath::root, |p| p.path.clone())
            .segment(env.field.response_key());
        Self { env, parent, path }
    }

    pub fn field(&self) -> &Field {
        &self.env.field
    }

    pub fn field_definition(&self) -> &FieldDef {
        &self.env.field_definition
    }

    /// The composite type declaring the field.
    pub fn parent_type(&self) -> &str {
        &self.env.parent_type
    }

    pub fn path(&self) -> &ResultPath {
        &self.path
    }

    /// Arguments after variable substitution and defaulting.
    pub fn arguments(&self) -> &Arguments {
        &self.env.arguments
    }

    pub fn argument_value(&self, name: &str) -> Option<&Value> {
        self.env.arguments.get(name)
    }

    pub fn argument_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.env.arguments.get_as(name)
    }

    /// The enclosing field, if this one is nested.
    pub fn parent_field_and_arguments(&self) -> Option<&FieldAndArguments> {
        self.parent.as_deref()
    }
}
