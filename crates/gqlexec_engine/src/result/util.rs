//! Turning result trees into results.

use super::traverse::{depth_first, NodeVisitor};
use super::{ExecutionResult, ExecutionResultNode};
use crate::error::GraphQLError;
use serde_json::{Map, Value};

/// The response data a node renders to, with null propagation applied.
pub fn to_data(node: &ExecutionResultNode) -> Value {
    match node {
        ExecutionResultNode::Leaf(_) => {
            let resolved = node.resolved_value();
            if resolved.is_null_value() || node.non_nullable_field_was_null_error().is_some() {
                Value::Null
            } else {
                resolved.completed_value().clone()
            }
        }
        ExecutionResultNode::List(_) => {
            if any_child_was_null(node) || node.resolved_value().is_null_value() {
                Value::Null
            } else {
                Value::Array(node.children().iter().map(to_data).collect())
            }
        }
        ExecutionResultNode::UnresolvedObject(_) => {
            let info = node.step_info();
            Value::String(format!(
                "Not resolved : {} with field {}",
                info.path(),
                info.result_key().unwrap_or_default()
            ))
        }
        ExecutionResultNode::Object(_) | ExecutionResultNode::Root { .. } => {
            let null_object = !node.is_root() && node.resolved_value().is_null_value();
            if any_child_was_null(node) || null_object {
                return Value::Null;
            }
            Value::Object(fields_of(node))
        }
    }
}

fn any_child_was_null(node: &ExecutionResultNode) -> bool {
    node.children()
        .iter()
        .any(|child| child.non_nullable_field_was_null_error().is_some())
}

fn fields_of(node: &ExecutionResultNode) -> Map<String, Value> {
    node.children()
        .iter()
        .map(|child| {
            let key = child.step_info().result_key().unwrap_or_default().to_string();
            (key, to_data(child))
        })
        .collect()
}

/// Collects node errors, field errors, and the non-null violations that started a null
/// propagation.
#[derive(Default)]
struct ErrorCollector {
    errors: Vec<GraphQLError>,
}

impl NodeVisitor for ErrorCollector {
    fn enter(&mut self, node: &ExecutionResultNode) {
        self.errors.extend(node.errors().iter().cloned());
        if node.is_root() {
            return;
        }
        self.errors
            .extend(node.resolved_value().errors().iter().cloned());
        if let Some(error) = node.non_nullable_field_was_null_error() {
            if !any_child_was_null(node) {
                self.errors.push(error.to_graphql_error());
            }
        }
    }
}

/// Builds the result a root node stands for.
pub fn to_execution_result(root: &ExecutionResultNode) -> ExecutionResult {
    let mut collector = ErrorCollector::default();
    depth_first(&mut collector, root);
    ExecutionResult::new(Some(to_data(root)), collector.errors)
}
