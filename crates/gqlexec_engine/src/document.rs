//! Executable documents.
//!
//! Parsing is done elsewhere; this module is the typed tree the engine executes, plus
//! builders for constructing documents in code.

use crate::error::GraphQLError;
use crate::schema::TypeRef;
use gqlexec_core::SourceLocation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A parsed, executable document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub definitions: Vec<Definition>,
}

/// A top-level definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation.
    #[must_use]
    pub fn with_operation(mut self, operation: OperationDefinition) -> Self {
        self.definitions.push(Definition::Operation(operation));
        self
    }

    /// Adds a fragment.
    #[must_use]
    pub fn with_fragment(mut self, fragment: FragmentDefinition) -> Self {
        self.definitions.push(Definition::Fragment(fragment));
        self
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        })
    }

    pub fn fragments(&self) -> impl Iterator<Item = &FragmentDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Fragment(f) => Some(f),
            Definition::Operation(_) => None,
        })
    }

    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments().find(|f| f.name == name)
    }

    /// Selects the operation to run.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, GraphQLError> {
        match name {
            Some(name) => self
                .operations()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| GraphQLError::validation(format!("Unknown operation named '{name}'."))),
            None => {
                let mut operations = self.operations();
                let first = operations
                    .next()
                    .ok_or_else(|| GraphQLError::validation("Must provide an operation."))?;
                if operations.next().is_some() {
                    return Err(GraphQLError::validation(
                        "Must provide operation name if query contains multiple operations.",
                    ));
                }
                Ok(first)
            }
        }
    }
}

/// The type of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// An operation definition.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub operation: OperationType,
    pub name: Option<String>,
    pub variable_definitions: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub location: Option<SourceLocation>,
}

impl OperationDefinition {
    /// Creates an anonymous operation.
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            name: None,
            variable_definitions: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
            location: None,
        }
    }

    pub fn query() -> Self {
        Self::new(OperationType::Query)
    }

    pub fn mutation() -> Self {
        Self::new(OperationType::Mutation)
    }

    pub fn subscription() -> Self {
        Self::new(OperationType::Subscription)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_variable(mut self, variable: VariableDefinition) -> Self {
        self.variable_definitions.push(variable);
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// A variable definition such as `$id: ID! = "1"`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<InputValue>,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<InputValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// A named fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl FragmentDefinition {
    pub fn new(name: impl Into<String>, type_condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_condition: type_condition.into(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }
}

/// An ordered selection set.
///
/// Selections are shared, so cloning a field (and its sub-selections) is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    selections: Arc<Vec<Selection>>,
}

impl SelectionSet {
    pub fn new(selections: Vec<Selection>) -> Self {
        Self {
            selections: Arc::new(selections),
        }
    }

    pub fn push(&mut self, selection: Selection) {
        Arc::make_mut(&mut self.selections).push(selection);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Selection> {
        self.selections.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

impl<'a> IntoIterator for &'a SelectionSet {
    type Item = &'a Selection;
    type IntoIter = std::slice::Iter<'a, Selection>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl From<FragmentSpread> for Selection {
    fn from(spread: FragmentSpread) -> Self {
        Self::FragmentSpread(spread)
    }
}

impl From<InlineFragment> for Selection {
    fn from(fragment: InlineFragment) -> Self {
        Self::InlineFragment(fragment)
    }
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: IndexMap<String, InputValue>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub location: Option<SourceLocation>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
            location: None,
        }
    }

    /// The key this field is reported under: its alias, else its name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// A fragment spread (`...Name`).
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
}

impl FragmentSpread {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directives: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

/// An inline fragment (`... on Type { }`).
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl InlineFragment {
    pub fn new(type_condition: Option<&str>) -> Self {
        Self {
            type_condition: type_condition.map(str::to_string),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
        }
    }

    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }
}

/// A directive applied in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: IndexMap<String, InputValue>,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// `@skip(if: ...)`
    pub fn skip(condition: impl Into<InputValue>) -> Self {
        Self::new("skip").with_argument("if", condition)
    }

    /// `@include(if: ...)`
    pub fn include(condition: impl Into<InputValue>) -> Self {
        Self::new("include").with_argument("if", condition)
    }
}

/// A literal input value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Enum(String),
    List(Vec<InputValue>),
    Object(IndexMap<String, InputValue>),
    Variable(String),
}

impl InputValue {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn enum_value(name: impl Into<String>) -> Self {
        Self::Enum(name.into())
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for InputValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for InputValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for InputValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<InputValue>> From<Vec<T>> for InputValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}
