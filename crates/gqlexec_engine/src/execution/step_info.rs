//! Where a value sits while it is being executed.

use super::fields::MergedField;
use crate::path::ResultPath;
use crate::schema::{FieldDef, TypeRef};
use crate::values::Arguments;
use std::sync::Arc;

/// Type and position of one value during execution.
#[derive(Debug, Clone)]
pub struct ExecutionStepInfo {
    ty: TypeRef,
    field: Option<MergedField>,
    field_definition: Option<FieldDef>,
    parent_type: Option<String>,
    path: ResultPath,
    arguments: Arguments,
    parent: Option<Arc<ExecutionStepInfo>>,
}

impl ExecutionStepInfo {
    /// Step info of an operation root.
    pub fn root(ty: TypeRef) -> Self {
        Self {
            ty,
            field: None,
            field_definition: None,
            parent_type: None,
            path: ResultPath::root(),
            arguments: Arguments::new(),
            parent: None,
        }
    }

    /// Step info of a field selected on `parent`.
    pub fn for_field(
        parent: &Arc<ExecutionStepInfo>,
        field: MergedField,
        field_definition: FieldDef,
        parent_type: impl Into<String>,
        arguments: Arguments,
    ) -> Self {
        Self {
            ty: field_definition.ty.clone(),
            path: parent.path.segment(field.result_key()),
            field: Some(field),
            field_definition: Some(field_definition),
            parent_type: Some(parent_type.into()),
            arguments,
            parent: Some(Arc::clone(parent)),
        }
    }

    /// Step info of the list item at `index`, typed `item_type`.
    pub fn for_list_item(self: &Arc<Self>, index: usize, item_type: TypeRef) -> Self {
        Self {
            ty: item_type,
            path: self.path.index(index),
            parent: Some(Arc::clone(self)),
            ..(**self).clone()
        }
    }

    /// Replaces the type with a resolved object type, keeping a non-null wrapper.
    #[must_use]
    pub fn with_resolved_type(&self, object_type: &str) -> Self {
        let named = TypeRef::named(object_type);
        let ty = if self.ty.is_non_null() {
            TypeRef::non_null(named)
        } else {
            named
        };
        Self {
            ty,
            ..self.clone()
        }
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn is_non_null_type(&self) -> bool {
        self.ty.is_non_null()
    }

    pub fn field(&self) -> Option<&MergedField> {
        self.field.as_ref()
    }

    pub fn field_definition(&self) -> Option<&FieldDef> {
        self.field_definition.as_ref()
    }

    pub fn parent_type(&self) -> Option<&str> {
        self.parent_type.as_deref()
    }

    pub fn path(&self) -> &ResultPath {
        &self.path
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionStepInfo>> {
        self.parent.as_ref()
    }

    /// The key of the field this value belongs to, if any.
    pub fn result_key(&self) -> Option<&str> {
        self.field.as_ref().map(MergedField::result_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;

    #[test]
    fn test_field_and_list_item_paths() {
        let root = Arc::new(ExecutionStepInfo::root(TypeRef::named_non_null("Query")));
        let users = Arc::new(ExecutionStepInfo::for_field(
            &root,
            MergedField::new(Field::new("users").with_alias("people")),
            FieldDef::new("users", TypeRef::list(TypeRef::named_non_null("User"))),
            "Query",
            Arguments::new(),
        ));
        assert_eq!(users.path().to_string(), "/people");

        let item = users.for_list_item(1, TypeRef::named_non_null("User"));
        assert_eq!(item.path().to_string(), "/people[1]");
        assert!(item.is_non_null_type());
        assert_eq!(item.result_key(), Some("people"));
    }

    #[test]
    fn test_resolved_type_keeps_non_null() {
        let info = ExecutionStepInfo::root(TypeRef::named_non_null("Node"));
        let resolved = info.with_resolved_type("User");
        assert_eq!(resolved.ty(), &TypeRef::named_non_null("User"));
    }
}
