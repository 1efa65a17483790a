//! Field collection.

use crate::document::{Document, Field, Selection, SelectionSet};
use crate::schema::Schema;
use crate::values::{should_include, Variables};
use gqlexec_core::SourceLocation;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::warn;

/// All selections of one response key, merged.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    fields: Vec<Field>,
}

impl MergedField {
    /// Creates a merged field from its first selection.
    pub fn new(field: Field) -> Self {
        Self {
            fields: vec![field],
        }
    }

    pub(crate) fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// The first selection, which carries name, alias and arguments.
    pub fn single_field(&self) -> &Field {
        &self.fields[0]
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn name(&self) -> &str {
        &self.single_field().name
    }

    pub fn result_key(&self) -> &str {
        self.single_field().response_key()
    }

    pub fn location(&self) -> Option<SourceLocation> {
        self.single_field().location.clone()
    }

    /// Sub-selections of every merged selection, in order.
    pub fn sub_selections(&self) -> impl Iterator<Item = &SelectionSet> {
        self.fields.iter().map(|f| &f.selection_set)
    }
}

/// Collects the fields `selection_sets` select on `object_type`, keyed by response key.
///
/// Fields the type does not define are dropped.
pub fn collect_fields<'a>(
    schema: &Schema,
    document: &Document,
    variables: &Variables,
    object_type: &str,
    selection_sets: impl IntoIterator<Item = &'a SelectionSet>,
) -> IndexMap<String, MergedField> {
    let mut collector = Collector {
        schema,
        document,
        variables,
        object_type,
        visited_fragments: FxHashSet::default(),
        fields: IndexMap::new(),
    };
    for selection_set in selection_sets {
        collector.collect(selection_set);
    }
    collector.fields
}

struct Collector<'a> {
    schema: &'a Schema,
    document: &'a Document,
    variables: &'a Variables,
    object_type: &'a str,
    visited_fragments: FxHashSet<String>,
    fields: IndexMap<String, MergedField>,
}

impl Collector<'_> {
    fn collect(&mut self, selection_set: &SelectionSet) {
        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    if !should_include(&field.directives, self.variables) {
                        continue;
                    }
                    if self.schema.field(self.object_type, &field.name).is_none() {
                        warn!(
                            field = %field.name,
                            object_type = %self.object_type,
                            "skipping field not defined on type"
                        );
                        continue;
                    }
                    match self.fields.get_mut(field.response_key()) {
                        Some(merged) => merged.push(field.clone()),
                        None => {
                            self.fields
                                .insert(field.response_key().to_string(), MergedField::new(field.clone()));
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !should_include(&spread.directives, self.variables)
                        || !self.visited_fragments.insert(spread.name.clone())
                    {
                        continue;
                    }
                    let Some(fragment) = self.document.fragment(&spread.name) else {
                        warn!(fragment = %spread.name, "unknown fragment");
                        continue;
                    };
                    if !self
                        .schema
                        .is_possible_type(&fragment.type_condition, self.object_type)
                    {
                        continue;
                    }
                    self.collect(&fragment.selection_set);
                }
                Selection::InlineFragment(inline) => {
                    if !should_include(&inline.directives, self.variables) {
                        continue;
                    }
                    if let Some(condition) = &inline.type_condition {
                        if !self.schema.is_possible_type(condition, self.object_type) {
                            continue;
                        }
                    }
                    self.collect(&inline.selection_set);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Directive, FragmentDefinition, FragmentSpread, InlineFragment};
    use crate::schema::{FieldDef, ObjectDef, SchemaBuilder, TypeDef, TypeRef, UnionDef};

    fn schema() -> Schema {
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(TypeDef::Object(
                ObjectDef::new("User")
                    .field(FieldDef::new("id", TypeRef::named_non_null("ID")))
                    .field(FieldDef::new("name", TypeRef::named("String"))),
            ))
            .add_type(TypeDef::Union(UnionDef::new("Entity", &["User"])))
            .build()
    }

    fn selections(selections: Vec<Selection>) -> SelectionSet {
        SelectionSet::new(selections)
    }

    #[test]
    fn test_merges_same_response_key() {
        let set = selections(vec![
            Field::new("id").into(),
            Field::new("name").into(),
            Field::new("id").into(),
        ]);
        let fields = collect_fields(&schema(), &Document::new(), &Variables::new(), "User", [&set]);
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(fields["id"].fields().len(), 2);
    }

    #[test]
    fn test_skip_include_and_unknown_fields() {
        let set = selections(vec![
            Field::new("id").with_directive(Directive::skip(true)).into(),
            Field::new("name").with_directive(Directive::include(false)).into(),
            Field::new("missing").into(),
            Field::new("__typename").into(),
        ]);
        let fields = collect_fields(&schema(), &Document::new(), &Variables::new(), "User", [&set]);
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["__typename"]);
    }

    #[test]
    fn test_fragments_respect_type_conditions() {
        let document = Document::new()
            .with_fragment(FragmentDefinition::new("F", "Entity").with_selection(Field::new("id")));
        let set = selections(vec![
            FragmentSpread::new("F").into(),
            FragmentSpread::new("F").into(),
            InlineFragment::new(Some("Query"))
                .with_selection(Field::new("name"))
                .into(),
            InlineFragment::new(None)
                .with_selection(Field::new("name").with_alias("label"))
                .into(),
        ]);
        let fields = collect_fields(&schema(), &document, &Variables::new(), "User", [&set]);
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id", "label"]);
        assert_eq!(fields["label"].name(), "name");
    }
}
