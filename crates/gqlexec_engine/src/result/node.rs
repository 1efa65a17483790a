use super::ResolvedValue;
use crate::assert::should_never_happen;
use crate::error::{ErrorClassification, GraphQLError};
use crate::execution::ExecutionStepInfo;
use crate::path::ResultPath;
use gqlexec_core::SourceLocation;
use std::sync::Arc;
use thiserror::Error;

/// A null reached a position whose type is non-null.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot return null for non-nullable type: '{type_name}' within parent '{parent_type}' ({path})")]
pub struct NonNullableFieldWasNullError {
    pub type_name: String,
    pub parent_type: String,
    pub path: ResultPath,
    pub location: Option<SourceLocation>,
}

impl NonNullableFieldWasNullError {
    /// Creates the error for the value described by `step_info`.
    pub fn new(step_info: &ExecutionStepInfo) -> Self {
        let parent_type = match step_info.parent() {
            Some(parent) => parent.ty().nullable().to_string(),
            None => step_info.parent_type().unwrap_or_default().to_string(),
        };
        Self {
            type_name: step_info.ty().nullable().to_string(),
            parent_type,
            path: step_info.path().clone(),
            location: step_info.field().and_then(|f| f.location()),
        }
    }

    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError::new(self.to_string(), ErrorClassification::NullValueInNonNullableField)
            .with_path(&self.path)
            .with_location(self.location.clone())
    }
}

/// The payload shared by every non-root node.
#[derive(Debug, Clone)]
pub struct NodeData {
    step_info: Arc<ExecutionStepInfo>,
    resolved_value: ResolvedValue,
    non_nullable_field_was_null_error: Option<NonNullableFieldWasNullError>,
    children: Vec<ExecutionResultNode>,
    errors: Vec<GraphQLError>,
}

/// An immutable node of the result tree.
///
/// Updates go through the `with_new_*` methods, which return a new node of the same
/// variant.
#[derive(Debug, Clone)]
pub enum ExecutionResultNode {
    Leaf(NodeData),
    Object(NodeData),
    List(NodeData),
    /// An object whose fields have not been executed yet.
    UnresolvedObject(NodeData),
    Root {
        children: Vec<ExecutionResultNode>,
        errors: Vec<GraphQLError>,
    },
}

/// The error a composite node carries when one of its children violated non-null and the
/// node itself cannot be null either.
fn propagated_error(
    step_info: &ExecutionStepInfo,
    children: &[ExecutionResultNode],
) -> Option<NonNullableFieldWasNullError> {
    let child_was_null = children
        .iter()
        .any(|c| c.non_nullable_field_was_null_error().is_some());
    (child_was_null && step_info.is_non_null_type())
        .then(|| NonNullableFieldWasNullError::new(step_info))
}

impl ExecutionResultNode {
    pub fn leaf(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: ResolvedValue,
        non_nullable_field_was_null_error: Option<NonNullableFieldWasNullError>,
    ) -> Self {
        Self::Leaf(NodeData {
            step_info,
            resolved_value,
            non_nullable_field_was_null_error,
            children: Vec::new(),
            errors: Vec::new(),
        })
    }

    pub fn object(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: ResolvedValue,
        children: Vec<ExecutionResultNode>,
    ) -> Self {
        Self::Object(NodeData {
            non_nullable_field_was_null_error: propagated_error(&step_info, &children),
            step_info,
            resolved_value,
            children,
            errors: Vec::new(),
        })
    }

    pub fn list(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: ResolvedValue,
        children: Vec<ExecutionResultNode>,
    ) -> Self {
        Self::List(NodeData {
            non_nullable_field_was_null_error: propagated_error(&step_info, &children),
            step_info,
            resolved_value,
            children,
            errors: Vec::new(),
        })
    }

    pub fn unresolved_object(step_info: Arc<ExecutionStepInfo>, resolved_value: ResolvedValue) -> Self {
        Self::UnresolvedObject(NodeData {
            step_info,
            resolved_value,
            non_nullable_field_was_null_error: None,
            children: Vec::new(),
            errors: Vec::new(),
        })
    }

    pub fn root(children: Vec<ExecutionResultNode>, errors: Vec<GraphQLError>) -> Self {
        Self::Root { children, errors }
    }

    fn data(&self) -> Option<&NodeData> {
        match self {
            Self::Leaf(d) | Self::Object(d) | Self::List(d) | Self::UnresolvedObject(d) => Some(d),
            Self::Root { .. } => None,
        }
    }

    fn into_data(self, operation: &str) -> NodeData {
        match self {
            Self::Leaf(d) | Self::Object(d) | Self::List(d) | Self::UnresolvedObject(d) => d,
            Self::Root { .. } => should_never_happen(format!("'{operation}' called on the root node")),
        }
    }

    /// Rebuilds a node of the same variant around `data`.
    fn same_variant(&self, data: NodeData) -> Self {
        match self {
            Self::Leaf(_) => Self::Leaf(data),
            Self::Object(_) => Self::Object(data),
            Self::List(_) => Self::List(data),
            Self::UnresolvedObject(_) => Self::UnresolvedObject(data),
            Self::Root { .. } => should_never_happen("root nodes carry no node data"),
        }
    }

    /// Step info of this node. Panics on the root node.
    #[track_caller]
    pub fn step_info(&self) -> &Arc<ExecutionStepInfo> {
        match self.data() {
            Some(d) => &d.step_info,
            None => should_never_happen("the root node has no execution step info"),
        }
    }

    /// Resolved value of this node. Panics on the root node.
    #[track_caller]
    pub fn resolved_value(&self) -> &ResolvedValue {
        match self.data() {
            Some(d) => &d.resolved_value,
            None => should_never_happen("the root node has no resolved value"),
        }
    }

    pub fn non_nullable_field_was_null_error(&self) -> Option<&NonNullableFieldWasNullError> {
        self.data()?.non_nullable_field_was_null_error.as_ref()
    }

    pub fn children(&self) -> &[ExecutionResultNode] {
        match self {
            Self::Root { children, .. } => children,
            other => other.data().map(|d| d.children.as_slice()).unwrap_or_default(),
        }
    }

    pub fn errors(&self) -> &[GraphQLError] {
        match self {
            Self::Root { errors, .. } => errors,
            other => other.data().map(|d| d.errors.as_slice()).unwrap_or_default(),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root { .. })
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::UnresolvedObject(_))
    }

    /// A node of the same variant with `children`.
    ///
    /// Leaves have no children: passing a non-empty list to a leaf panics.
    #[must_use]
    #[track_caller]
    pub fn with_new_children(&self, children: Vec<ExecutionResultNode>) -> Self {
        match self {
            Self::Root { errors, .. } => Self::Root {
                children,
                errors: errors.clone(),
            },
            Self::Leaf(d) => {
                if !children.is_empty() {
                    should_never_happen("leaf nodes cannot have children");
                }
                Self::Leaf(d.clone())
            }
            Self::Object(d) | Self::List(d) | Self::UnresolvedObject(d) => {
                let data = NodeData {
                    non_nullable_field_was_null_error: propagated_error(&d.step_info, &children),
                    children,
                    ..d.clone()
                };
                self.same_variant(data)
            }
        }
    }

    /// A node of the same variant with `resolved_value`. Panics on the root node.
    #[must_use]
    #[track_caller]
    pub fn with_new_resolved_value(&self, resolved_value: ResolvedValue) -> Self {
        let data = NodeData {
            resolved_value,
            ..self.clone().into_data("with_new_resolved_value")
        };
        self.same_variant(data)
    }

    /// A node of the same variant with `step_info`. Panics on the root node.
    #[must_use]
    #[track_caller]
    pub fn with_new_step_info(&self, step_info: Arc<ExecutionStepInfo>) -> Self {
        let data = NodeData {
            step_info,
            ..self.clone().into_data("with_new_step_info")
        };
        self.same_variant(data)
    }

    /// A node of the same variant with `errors`.
    #[must_use]
    pub fn with_new_errors(&self, errors: Vec<GraphQLError>) -> Self {
        match self {
            Self::Root { children, .. } => Self::Root {
                children: children.clone(),
                errors,
            },
            other => {
                let data = NodeData {
                    errors,
                    ..other.clone().into_data("with_new_errors")
                };
                other.same_variant(data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;
    use crate::execution::MergedField;
    use crate::schema::{FieldDef, TypeRef};
    use crate::values::Arguments;
    use serde_json::json;

    fn step(name: &str, ty: TypeRef) -> Arc<ExecutionStepInfo> {
        let root = Arc::new(ExecutionStepInfo::root(TypeRef::named_non_null("Query")));
        Arc::new(ExecutionStepInfo::for_field(
            &root,
            MergedField::new(Field::new(name)),
            FieldDef::new(name, ty),
            "Query",
            Arguments::new(),
        ))
    }

    fn null_leaf(name: &str) -> ExecutionResultNode {
        let info = step(name, TypeRef::named_non_null("String"));
        let error = NonNullableFieldWasNullError::new(&info);
        ExecutionResultNode::leaf(info, ResolvedValue::null(), Some(error))
    }

    #[test]
    fn test_non_null_message() {
        let node = null_leaf("name");
        let error = node.non_nullable_field_was_null_error().unwrap();
        assert_eq!(
            error.to_string(),
            "Cannot return null for non-nullable type: 'String' within parent 'Query' (/name)"
        );
        assert_eq!(
            error.to_graphql_error().classification,
            ErrorClassification::NullValueInNonNullableField
        );
    }

    #[test]
    fn test_with_new_keeps_variant_and_other_fields() {
        let info = step("user", TypeRef::named("User"));
        let object = ExecutionResultNode::object(
            Arc::clone(&info),
            ResolvedValue::builder().completed_value(json!({})).build(),
            vec![],
        );

        let with_errors = object.with_new_errors(vec![GraphQLError::validation("x")]);
        assert!(matches!(with_errors, ExecutionResultNode::Object(_)));
        assert_eq!(with_errors.errors().len(), 1);
        assert!(Arc::ptr_eq(with_errors.step_info(), &info));
        assert!(object.errors().is_empty());

        let with_value = object.with_new_resolved_value(ResolvedValue::null());
        assert!(matches!(with_value, ExecutionResultNode::Object(_)));
        assert!(with_value.resolved_value().is_null_value());
        assert!(!object.resolved_value().is_null_value());

        let unresolved = ExecutionResultNode::unresolved_object(Arc::clone(&info), ResolvedValue::default());
        let moved = unresolved.with_new_step_info(step("other", TypeRef::named("User")));
        assert!(moved.is_unresolved());
        assert_eq!(moved.step_info().path().to_string(), "/other");
    }

    #[test]
    fn test_leaf_accepts_empty_children() {
        let leaf = null_leaf("name");
        let same = leaf.with_new_children(vec![]);
        assert!(matches!(same, ExecutionResultNode::Leaf(_)));
        assert!(same.non_nullable_field_was_null_error().is_some());
    }

    #[test]
    #[should_panic(expected = "leaf nodes cannot have children")]
    fn test_leaf_rejects_children() {
        null_leaf("a").with_new_children(vec![null_leaf("b")]);
    }

    #[test]
    #[should_panic(expected = "should never happen")]
    fn test_root_has_no_step_info() {
        ExecutionResultNode::root(vec![], vec![]).step_info();
    }

    #[test]
    #[should_panic(expected = "should never happen")]
    fn test_root_rejects_new_resolved_value() {
        ExecutionResultNode::root(vec![], vec![]).with_new_resolved_value(ResolvedValue::null());
    }

    #[test]
    fn test_non_null_propagates_only_through_non_null_parents() {
        let nullable = ExecutionResultNode::object(
            step("user", TypeRef::named("User")),
            ResolvedValue::default(),
            vec![null_leaf("name")],
        );
        assert!(nullable.non_nullable_field_was_null_error().is_none());

        let non_null = ExecutionResultNode::object(
            step("user", TypeRef::named_non_null("User")),
            ResolvedValue::default(),
            vec![null_leaf("name")],
        );
        assert!(non_null.non_nullable_field_was_null_error().is_some());

        let cleared = non_null.with_new_children(vec![]);
        assert!(cleared.non_nullable_field_was_null_error().is_none());
    }
}
