//! Executing operations: contexts, field collection, strategies and subscriptions.

mod context;
mod engine;
mod fields;
mod step_info;
mod strategy;
mod subscription;

pub use context::{Context, ExecutionContext, ExecutionId};
pub use engine::{Engine, EngineBuilder, ExecutionInput};
pub use fields::{collect_fields, MergedField};
pub use step_info::ExecutionStepInfo;
pub use strategy::{CompleteValueType, ExecutionStrategyParameters, FieldValueInfo};

#[cfg(test)]
pub(crate) use context::test_support;
