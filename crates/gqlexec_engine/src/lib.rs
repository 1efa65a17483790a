//! GraphQL execution engine.
//!
//! This crate executes GraphQL operations against an in-memory schema:
//! - `execution`: The engine, execution contexts and the execution strategies
//! - `result`: The execution result tree and its conversion to response data
//! - `dataloader`: Batching loaders, their registry and dispatch statistics
//! - `instrumentation`: Execution hooks, data loader dispatch and field validation
//! - `fetcher`: Data fetchers, batched fetchers and the code registry
//! - `reactive`: Back-pressured publishers used by subscriptions
//! - `relay`: Cursor connections and global ids
//! - `introspection`: The `__schema`, `__type` and `__typename` meta fields

pub mod assert;
pub mod config;
pub mod dataloader;
pub mod document;
pub mod error;
pub mod execution;
pub mod fetcher;
pub mod instrumentation;
pub mod introspection;
pub mod path;
pub mod reactive;
pub mod relay;
pub mod result;
pub mod schema;
pub mod traversal;
pub mod values;

pub use config::{DataLoaderDispatcherOptions, DataLoaderOptions, ExecutionConfig, ExecutionStrategyKind};
pub use dataloader::{create_loader, BatchLoader, DataLoader, DataLoaderRegistry, LoadError, Statistics};
pub use document::{Document, Field, FragmentDefinition, InlineFragment, OperationDefinition, OperationType};
pub use error::{AbortExecution, ErrorClassification, FieldError, GraphQLError};
pub use execution::{Context, Engine, EngineBuilder, ExecutionInput};
pub use fetcher::{CodeRegistry, DataFetcher, DataFetcherResult, DataFetchingEnvironment};
pub use instrumentation::{Instrumentation, SimpleInstrumentation};
pub use path::{PathSegment, ResultPath};
pub use result::{ExecutionResult, ExecutionResultNode};
pub use schema::{Schema, SchemaBuilder};
pub use values::{Arguments, Variables};
