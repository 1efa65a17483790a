use super::{FieldAndArguments, FieldValidation, FieldValidationEnvironment};
use crate::error::GraphQLError;
use crate::path::ResultPath;
use indexmap::IndexMap;
use std::sync::Arc;

type Rule = Arc<dyn Fn(&FieldAndArguments, &FieldValidationEnvironment) -> Option<GraphQLError> + Send + Sync>;

/// Runs a rule against every field occurrence at a given path.
#[derive(Clone, Default)]
pub struct SimpleFieldValidation {
    rules: IndexMap<ResultPath, Rule>,
}

impl SimpleFieldValidation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for the fields at `path`, replacing any earlier rule for it.
    #[must_use]
    pub fn add_rule<F>(mut self, path: ResultPath, rule: F) -> Self
    where
        F: Fn(&FieldAndArguments, &FieldValidationEnvironment) -> Option<GraphQLError>
            + Send
            + Sync
            + 'static,
    {
        self.rules.insert(path, Arc::new(rule));
        self
    }
}

impl FieldValidation for SimpleFieldValidation {
    fn validate_fields(&self, env: &FieldValidationEnvironment) -> Vec<GraphQLError> {
        let mut errors = Vec::new();
        for (path, rule) in &self.rules {
            let Some(fields) = env.fields_by_path().get(path) else {
                continue;
            };
            errors.extend(fields.iter().filter_map(|field| rule(field, env)));
        }
        errors
    }
}
