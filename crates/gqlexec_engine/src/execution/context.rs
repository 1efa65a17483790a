//! Request and execution contexts.

use crate::config::ExecutionConfig;
use crate::dataloader::DataLoaderRegistry;
use crate::document::{Document, FragmentDefinition, OperationDefinition};
use crate::fetcher::CodeRegistry;
use crate::instrumentation::{Instrumentation, InstrumentationState};
use crate::schema::Schema;
use crate::values::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Request-scoped data handed to every data fetcher.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request-scoped data.
    pub data: HashMap<String, Value>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Sets a value, builder style.
    #[must_use]
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Identifies one execution in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec-{}", self.0)
    }
}

/// Everything one execution shares across its fields.
pub struct ExecutionContext {
    pub(crate) execution_id: ExecutionId,
    pub(crate) schema: Arc<Schema>,
    pub(crate) document: Arc<Document>,
    pub(crate) operation: OperationDefinition,
    pub(crate) variables: Arc<Variables>,
    pub(crate) root_value: Value,
    pub(crate) context: Context,
    pub(crate) data_loader_registry: DataLoaderRegistry,
    pub(crate) code_registry: Arc<CodeRegistry>,
    pub(crate) instrumentation: Arc<dyn Instrumentation>,
    pub(crate) instrumentation_state: Option<InstrumentationState>,
    pub(crate) config: ExecutionConfig,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("operation", &self.operation.name)
            .field("operation_type", &self.operation.operation)
            .finish()
    }
}

impl ExecutionContext {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn operation(&self) -> &OperationDefinition {
        &self.operation
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.document.fragment(name)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn root_value(&self) -> &Value {
        &self.root_value
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn data_loader_registry(&self) -> &DataLoaderRegistry {
        &self.data_loader_registry
    }

    pub fn code_registry(&self) -> &CodeRegistry {
        &self.code_registry
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn instrumentation_state(&self) -> Option<&InstrumentationState> {
        self.instrumentation_state.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::document::OperationType;
    use crate::instrumentation::SimpleInstrumentation;

    /// A context for driving instrumentation hooks directly.
    pub(crate) fn execution_context(
        schema: Schema,
        operation: OperationDefinition,
        registry: DataLoaderRegistry,
    ) -> ExecutionContext {
        let document = Document::new().with_operation(operation.clone());
        ExecutionContext {
            execution_id: ExecutionId::generate(),
            schema: Arc::new(schema),
            document: Arc::new(document),
            operation,
            variables: Arc::new(Variables::new()),
            root_value: Value::Null,
            context: Context::new(),
            data_loader_registry: registry,
            code_registry: Arc::new(CodeRegistry::new()),
            instrumentation: Arc::new(SimpleInstrumentation),
            instrumentation_state: None,
            config: ExecutionConfig::default(),
        }
    }

    pub(crate) fn query_operation() -> OperationDefinition {
        OperationDefinition::new(OperationType::Query)
    }
}
