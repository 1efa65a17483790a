//! Schema definition.
//!
//! Schemas are built once and shared immutably (`Arc<Schema>`) by every execution.

use crate::document::OperationType;
use crate::introspection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A GraphQL schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub description: Option<String>,
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
    pub directives: IndexMap<String, DirectiveDefinition>,
}

impl Schema {
    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Returns all types.
    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeDef)> {
        self.types.iter()
    }

    /// Returns the root type name for an operation type.
    pub fn root_type(&self, operation: OperationType) -> Option<&str> {
        match operation {
            OperationType::Query => self.query_type.as_deref(),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Looks up a field on a composite type, including the meta fields.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        if field_name == introspection::TYPENAME_FIELD {
            return Some(&*introspection::TYPENAME_META_FIELD);
        }
        if self.query_type.as_deref() == Some(type_name) {
            if field_name == introspection::SCHEMA_FIELD {
                return Some(&*introspection::SCHEMA_META_FIELD);
            }
            if field_name == introspection::TYPE_FIELD {
                return Some(&*introspection::TYPE_META_FIELD);
            }
        }
        self.types.get(type_name)?.fields()?.get(field_name)
    }

    /// Returns the object types an abstract type can resolve to.
    pub fn possible_types(&self, abstract_type: &str) -> Vec<&str> {
        match self.types.get(abstract_type) {
            Some(TypeDef::Union(union)) => union.members.iter().map(String::as_str).collect(),
            Some(TypeDef::Interface(_)) => self
                .types
                .values()
                .filter_map(|t| match t {
                    TypeDef::Object(o) if o.implements.iter().any(|i| i == abstract_type) => {
                        Some(o.name.as_str())
                    }
                    _ => None,
                })
                .collect(),
            Some(TypeDef::Object(o)) => vec![o.name.as_str()],
            _ => Vec::new(),
        }
    }

    /// Returns true if `object_type` satisfies the type condition `condition`.
    pub fn is_possible_type(&self, condition: &str, object_type: &str) -> bool {
        condition == object_type || self.possible_types(condition).contains(&object_type)
    }
}

/// A type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(s) => &s.name,
            Self::Object(o) => &o.name,
            Self::Interface(i) => &i.name,
            Self::Union(u) => &u.name,
            Self::Enum(e) => &e.name,
            Self::InputObject(i) => &i.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => s.description.as_deref(),
            Self::Object(o) => o.description.as_deref(),
            Self::Interface(i) => i.description.as_deref(),
            Self::Union(u) => u.description.as_deref(),
            Self::Enum(e) => e.description.as_deref(),
            Self::InputObject(i) => i.description.as_deref(),
        }
    }

    /// Output fields, for object and interface types.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            Self::Object(o) => Some(&o.fields),
            Self::Interface(i) => Some(&i.fields),
            _ => None,
        }
    }

    /// The `__TypeKind` of this type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "SCALAR",
            Self::Object(_) => "OBJECT",
            Self::Interface(_) => "INTERFACE",
            Self::Union(_) => "UNION",
            Self::Enum(_) => "ENUM",
            Self::InputObject(_) => "INPUT_OBJECT",
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }
}

/// Scalar type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

impl ScalarDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }
}

/// Interface type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// Union type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

impl UnionDef {
    pub fn new(name: impl Into<String>, members: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: None,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Enum type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: values.iter().map(|v| EnumValueDef::new(*v)).collect(),
        }
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.values.iter().any(|v| v.name == name)
    }
}

/// Enum value definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl EnumValueDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            deprecated: false,
            deprecation_reason: None,
        }
    }
}

/// Input object type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDef>,
}

/// Field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
    pub deprecated: bool,
    pub deprecation_reason: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            deprecated: false,
            deprecation_reason: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn argument(mut self, argument: InputValueDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecated = true;
        self.deprecation_reason = Some(reason.into());
        self
    }
}

/// Argument or input field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputValueDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Shorthand for `Name!`.
    pub fn named_non_null(name: impl Into<String>) -> Self {
        Self::non_null(Self::named(name))
    }

    /// The innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Strips one non-null wrapper, if present.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Directive definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveDefinition {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, InputValueDef>,
    pub locations: Vec<DirectiveLocation>,
    pub repeatable: bool,
}

/// Directive location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
    VariableDefinition,
    Schema,
    Scalar,
    Object,
    FieldDefinition,
    ArgumentDefinition,
    Interface,
    Union,
    Enum,
    EnumValue,
    InputObject,
    InputFieldDefinition,
}

/// Schema builder.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Creates a builder holding the built-in scalars, directives and introspection types.
    pub fn new() -> Self {
        let mut builder = Self::default();
        for name in ["Int", "Float", "String", "Boolean", "ID"] {
            builder.schema.types.insert(
                name.to_string(),
                TypeDef::Scalar(ScalarDef {
                    name: name.to_string(),
                    description: Some(format!("Built-in {name} scalar")),
                }),
            );
        }
        for type_def in introspection::INTROSPECTION_TYPES.iter() {
            builder
                .schema
                .types
                .insert(type_def.name().to_string(), type_def.clone());
        }
        for directive in builtin_directives() {
            builder
                .schema
                .directives
                .insert(directive.name.clone(), directive);
        }
        builder
    }

    /// Sets the schema description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.schema.description = Some(desc.into());
        self
    }

    /// Sets the query type.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.schema.query_type = Some(name.into());
        self
    }

    /// Sets the mutation type.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.schema.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription type.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.schema.subscription_type = Some(name.into());
        self
    }

    /// Adds a type.
    pub fn add_type(mut self, type_def: TypeDef) -> Self {
        self.schema
            .types
            .insert(type_def.name().to_string(), type_def);
        self
    }

    /// Adds a directive definition.
    pub fn add_directive(mut self, directive: DirectiveDefinition) -> Self {
        self.schema
            .directives
            .insert(directive.name.clone(), directive);
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

fn builtin_directives() -> Vec<DirectiveDefinition> {
    let condition = |name: &str, description: &str| DirectiveDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        arguments: IndexMap::from([(
            "if".to_string(),
            InputValueDef::new("if", TypeRef::named_non_null("Boolean")),
        )]),
        locations: vec![
            DirectiveLocation::Field,
            DirectiveLocation::FragmentSpread,
            DirectiveLocation::InlineFragment,
        ],
        repeatable: false,
    };
    vec![
        condition(
            "include",
            "Directs the executor to include this field or fragment only when the `if` argument is true",
        ),
        condition(
            "skip",
            "Directs the executor to skip this field or fragment when the `if` argument is true.",
        ),
        DirectiveDefinition {
            name: "deprecated".to_string(),
            description: Some("Marks the field or enum value as deprecated".to_string()),
            arguments: IndexMap::from([(
                "reason".to_string(),
                InputValueDef::new("reason", TypeRef::named("String"))
                    .with_default(Value::String("No longer supported".to_string())),
            )]),
            locations: vec![DirectiveLocation::FieldDefinition, DirectiveLocation::EnumValue],
            repeatable: false,
        },
    ]
}
