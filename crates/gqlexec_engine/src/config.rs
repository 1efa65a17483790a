//! Engine configuration.

use crate::document::OperationType;
use serde::{Deserialize, Serialize};

/// How the fields of one selection set are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategyKind {
    /// Start every sibling fetch before awaiting any of them.
    #[default]
    Async,
    /// Fetch and complete one field at a time, in document order.
    AsyncSerial,
}

/// Options of the data loader dispatch instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLoaderDispatcherOptions {
    /// Report loader statistics under the `dataloader` result extension.
    pub include_statistics: bool,
}

impl DataLoaderDispatcherOptions {
    #[must_use]
    pub fn with_include_statistics(mut self, include: bool) -> Self {
        self.include_statistics = include;
        self
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub query_strategy: ExecutionStrategyKind,
    pub mutation_strategy: ExecutionStrategyKind,
    pub subscription_strategy: ExecutionStrategyKind,
    pub dataloader: DataLoaderDispatcherOptions,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            query_strategy: ExecutionStrategyKind::Async,
            mutation_strategy: ExecutionStrategyKind::AsyncSerial,
            subscription_strategy: ExecutionStrategyKind::Async,
            dataloader: DataLoaderDispatcherOptions::default(),
        }
    }
}

impl ExecutionConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a configuration from JSON. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_query_strategy(mut self, strategy: ExecutionStrategyKind) -> Self {
        self.query_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_mutation_strategy(mut self, strategy: ExecutionStrategyKind) -> Self {
        self.mutation_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_subscription_strategy(mut self, strategy: ExecutionStrategyKind) -> Self {
        self.subscription_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_dataloader(mut self, options: DataLoaderDispatcherOptions) -> Self {
        self.dataloader = options;
        self
    }

    /// The strategy used for the root selection set of an operation.
    pub fn strategy_for(&self, operation: OperationType) -> ExecutionStrategyKind {
        match operation {
            OperationType::Query => self.query_strategy,
            OperationType::Mutation => self.mutation_strategy,
            OperationType::Subscription => self.subscription_strategy,
        }
    }
}

/// Options of a single data loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLoaderOptions {
    /// Queue loads until dispatched. When off, every load dispatches immediately.
    pub batching_enabled: bool,
    pub caching_enabled: bool,
    /// Upper bound on keys per batch call; unbounded when `None`.
    pub max_batch_size: Option<usize>,
}

impl Default for DataLoaderOptions {
    fn default() -> Self {
        Self {
            batching_enabled: true,
            caching_enabled: true,
            max_batch_size: None,
        }
    }
}

impl DataLoaderOptions {
    #[must_use]
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.strategy_for(OperationType::Query), ExecutionStrategyKind::Async);
        assert_eq!(
            config.strategy_for(OperationType::Mutation),
            ExecutionStrategyKind::AsyncSerial
        );
        assert!(!config.dataloader.include_statistics);
    }

    #[test]
    fn test_from_json_keeps_missing_defaults() {
        let config = ExecutionConfig::from_json_str(
            r#"{"query_strategy": "async_serial", "dataloader": {"include_statistics": true}}"#,
        )
        .unwrap();
        assert_eq!(config.query_strategy, ExecutionStrategyKind::AsyncSerial);
        assert_eq!(config.mutation_strategy, ExecutionStrategyKind::AsyncSerial);
        assert!(config.dataloader.include_statistics);
    }

    #[test]
    fn test_loader_options_builder() {
        let options = DataLoaderOptions::default()
            .with_caching(false)
            .with_max_batch_size(2);
        assert!(options.batching_enabled);
        assert!(!options.caching_enabled);
        assert_eq!(options.max_batch_size, Some(2));
    }
}
