//! Static traversal of an operation against the schema.
//!
//! Unlike execution, the traverser never calls a data fetcher: it walks the selections of
//! an operation (through fragment spreads and inline fragments) and tells a visitor about
//! every field it meets, typed against the schema.

use crate::document::{Document, Field, OperationDefinition, Selection, SelectionSet};
use crate::error::GraphQLError;
use crate::schema::{FieldDef, Schema};
use crate::values::{resolve_arguments, should_include, Arguments, Variables};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::trace;

/// One field occurrence met during traversal.
#[derive(Debug, Clone)]
pub struct QueryVisitorFieldEnvironment {
    pub field: Field,
    pub field_definition: FieldDef,
    /// The composite type declaring the field.
    pub parent_type: String,
    /// Arguments after variable substitution and defaulting.
    pub arguments: Arguments,
    pub parent_environment: Option<Arc<QueryVisitorFieldEnvironment>>,
}

/// Receives the fields of a traversal.
pub trait QueryVisitor {
    fn visit_field(&mut self, env: &Arc<QueryVisitorFieldEnvironment>);
}

impl<F> QueryVisitor for F
where
    F: FnMut(&Arc<QueryVisitorFieldEnvironment>),
{
    fn visit_field(&mut self, env: &Arc<QueryVisitorFieldEnvironment>) {
        self(env)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Order {
    Pre,
    Post,
}

/// Walks one operation of a document.
pub struct QueryTraverser<'a> {
    schema: &'a Schema,
    document: &'a Document,
    operation: &'a OperationDefinition,
    variables: &'a Variables,
}

impl<'a> QueryTraverser<'a> {
    /// Creates a traverser over the operation named `operation_name`.
    pub fn new(
        schema: &'a Schema,
        document: &'a Document,
        operation_name: Option<&str>,
        variables: &'a Variables,
    ) -> Result<Self, GraphQLError> {
        let operation = document.operation(operation_name)?;
        Ok(Self::for_operation(schema, document, operation, variables))
    }

    /// Creates a traverser over an already selected operation.
    pub fn for_operation(
        schema: &'a Schema,
        document: &'a Document,
        operation: &'a OperationDefinition,
        variables: &'a Variables,
    ) -> Self {
        Self {
            schema,
            document,
            operation,
            variables,
        }
    }

    /// Visits every field before its sub-fields.
    pub fn visit_pre_order<V: QueryVisitor + ?Sized>(&self, visitor: &mut V) {
        self.visit(visitor, Order::Pre);
    }

    /// Visits every field after its sub-fields.
    pub fn visit_post_order<V: QueryVisitor + ?Sized>(&self, visitor: &mut V) {
        self.visit(visitor, Order::Post);
    }

    fn visit<V: QueryVisitor + ?Sized>(&self, visitor: &mut V, order: Order) {
        let Some(root_type) = self.schema.root_type(self.operation.operation) else {
            trace!(operation = %self.operation.operation, "no root type to traverse");
            return;
        };
        let mut walk = Walk {
            traverser: self,
            visitor,
            order,
            fragments_in_progress: FxHashSet::default(),
        };
        walk.selection_set(&self.operation.selection_set, root_type, None);
    }
}

struct Walk<'t, 'a, V: ?Sized> {
    traverser: &'t QueryTraverser<'a>,
    visitor: &'t mut V,
    order: Order,
    fragments_in_progress: FxHashSet<String>,
}

impl<V: QueryVisitor + ?Sized> Walk<'_, '_, V> {
    fn selection_set(
        &mut self,
        selection_set: &SelectionSet,
        parent_type: &str,
        parent: Option<&Arc<QueryVisitorFieldEnvironment>>,
    ) {
        let variables = self.traverser.variables;
        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    if should_include(&field.directives, variables) {
                        self.field(field, parent_type, parent);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !should_include(&spread.directives, variables) {
                        continue;
                    }
                    let Some(fragment) = self.traverser.document.fragment(&spread.name) else {
                        continue;
                    };
                    if !self.fragments_in_progress.insert(spread.name.clone()) {
                        continue;
                    }
                    self.selection_set(&fragment.selection_set, &fragment.type_condition, parent);
                    self.fragments_in_progress.remove(&spread.name);
                }
                Selection::InlineFragment(inline) => {
                    if !should_include(&inline.directives, variables) {
                        continue;
                    }
                    let type_condition = inline.type_condition.as_deref().unwrap_or(parent_type);
                    self.selection_set(&inline.selection_set, type_condition, parent);
                }
            }
        }
    }

    fn field(
        &mut self,
        field: &Field,
        parent_type: &str,
        parent: Option<&Arc<QueryVisitorFieldEnvironment>>,
    ) {
        let Some(definition) = self.traverser.schema.field(parent_type, &field.name) else {
            trace!(field = %field.name, parent_type, "field not in schema");
            return;
        };
        let arguments = resolve_arguments(
            &definition.arguments,
            &field.arguments,
            self.traverser.variables,
        );
        let env = Arc::new(QueryVisitorFieldEnvironment {
            field: field.clone(),
            field_definition: definition.clone(),
            parent_type: parent_type.to_string(),
            arguments,
            parent_environment: parent.cloned(),
        });
        if self.order == Order::Pre {
            self.visitor.visit_field(&env);
        }
        if !field.selection_set.is_empty() {
            let field_type = definition.ty.named_type().to_string();
            self.selection_set(&field.selection_set, &field_type, Some(&env));
        }
        if self.order == Order::Post {
            self.visitor.visit_field(&env);
        }
    }
}
