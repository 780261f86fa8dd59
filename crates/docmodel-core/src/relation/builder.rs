//! Builders turn relation input into documents.
//!
//! The input is either the raw attribute value found on the base during lazy
//! build, or whatever the user assigned. Each relation family has its own
//! builder; [`Metadata::builder`] selects it.

use std::rc::Rc;

use crate::accessors::Assign;
use crate::attributes::{Attributes, ID_FIELD, Selector};
use crate::document::DocumentRef;
use crate::error::{RelationErrorKind, Result};
use crate::relation::{ManyRelation, Metadata, RelationMacro, Target, klass_for};
use crate::value::Value;

/// Key marking a nested attributes entry for removal.
pub const DESTROY_FIELD: &str = "_destroy";

/// Produces the target of a relation for one base document.
pub trait Builder {
    /// `Ok(None)` means the relation has no target.
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>>;
}

impl Metadata {
    /// Builder for this relation's family, fed with `input`.
    pub fn builder(&self, input: Assign) -> Result<Box<dyn Builder>> {
        let metadata = self.clone();
        Ok(match self.relation() {
            RelationMacro::ReferencesMany => Box::new(ReferencesMany { metadata, input }),
            RelationMacro::ReferencesManyAsArray => Box::new(ReferencesManyAsArray { metadata, input }),
            RelationMacro::ReferencesOne => Box::new(ReferencesOne { metadata, input }),
            RelationMacro::ReferencedIn => Box::new(ReferencedIn { metadata, input }),
            RelationMacro::EmbedsMany => Box::new(EmbedsMany { metadata, input }),
            RelationMacro::EmbedsOne => Box::new(EmbedsOne { metadata, input }),
            RelationMacro::EmbeddedIn => Box::new(EmbeddedIn { metadata, input }),
            other @ (RelationMacro::ReferencedInFromArray
            | RelationMacro::ReferencesAndReferencedInMany) => {
                return Err(self.error(
                    RelationErrorKind::Unsupported,
                    format!("{other} relations have no builder"),
                ));
            }
        })
    }

    /// Builder for nested attributes on this relation.
    pub fn nested_builder(
        &self,
        attributes: Vec<Attributes>,
        options: NestedOptions,
    ) -> NestedBuilder {
        NestedBuilder {
            metadata: self.clone(),
            attributes,
            options,
        }
    }
}

/// Documents from user input that is not a raw stored value.
fn assigned(base: &DocumentRef, metadata: &Metadata, input: Assign) -> Result<Option<Vec<DocumentRef>>> {
    Ok(match input {
        Assign::Nil | Assign::Raw(Value::Null) => None,
        Assign::Document(doc) => Some(vec![doc]),
        Assign::Documents(docs) => Some(docs),
        Assign::Attributes(attributes) => Some(vec![klass_for(base, metadata)?.new_document(attributes)?]),
        Assign::AttributesList(list) => {
            let klass = klass_for(base, metadata)?;
            Some(
                list.into_iter()
                    .map(|attributes| klass.new_document(attributes))
                    .collect::<Result<_>>()?,
            )
        }
        Assign::Raw(other) => {
            return Err(metadata.error(
                RelationErrorKind::InvalidTarget,
                format!("cannot build from a raw {} value", other.type_name()),
            ));
        }
    })
}

fn many(docs: Option<Vec<DocumentRef>>) -> Option<Target> {
    Some(Target::Many(docs.unwrap_or_default()))
}

fn one(metadata: &Metadata, docs: Option<Vec<DocumentRef>>) -> Result<Option<Target>> {
    match docs {
        None => Ok(None),
        Some(docs) => Ok(super::single(metadata, Target::Many(docs))?.map(Target::One)),
    }
}

/// Selector for documents whose foreign key points at `base`.
fn owned_by(base: &DocumentRef, metadata: &Metadata) -> Result<Selector> {
    let mut selector = Selector::new().eq(metadata.foreign_key()?, base.id());
    if metadata.as_role().is_some() {
        selector = selector.eq(metadata.type_attribute(), base.class_name());
    }
    Ok(selector)
}

struct ReferencesMany {
    metadata: Metadata,
    input: Assign,
}

impl Builder for ReferencesMany {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(_) => {
                if base.is_new_record() {
                    return Ok(many(None));
                }
                let selector = owned_by(base, &metadata)?;
                let docs = klass_for(base, &metadata)?.all(&selector)?;
                tracing::trace!(relation = metadata.name(), loaded = docs.len(), "Relation loaded");
                Ok(many(Some(docs)))
            }
            input => Ok(many(assigned(base, &metadata, input)?)),
        }
    }
}

struct ReferencesManyAsArray {
    metadata: Metadata,
    input: Assign,
}

impl Builder for ReferencesManyAsArray {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(Value::Array(ids)) if !ids.is_empty() => {
                let selector = Selector::new().any_in(ID_FIELD, ids);
                Ok(many(Some(klass_for(base, &metadata)?.all(&selector)?)))
            }
            Assign::Raw(Value::Array(_) | Value::Null) => Ok(many(None)),
            input => Ok(many(assigned(base, &metadata, input)?)),
        }
    }
}

struct ReferencesOne {
    metadata: Metadata,
    input: Assign,
}

impl Builder for ReferencesOne {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(_) => {
                if base.is_new_record() {
                    return Ok(None);
                }
                let selector = owned_by(base, &metadata)?;
                let found = klass_for(base, &metadata)?.all(&selector)?;
                Ok(found.into_iter().next().map(Target::One))
            }
            input => one(&metadata, assigned(base, &metadata, input)?),
        }
    }
}

struct ReferencedIn {
    metadata: Metadata,
    input: Assign,
}

impl Builder for ReferencedIn {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(Value::Null) => Ok(None),
            Assign::Raw(id) => {
                let session = base.session();
                let class = if metadata.is_polymorphic() {
                    let Some(name) = base.get(&metadata.type_attribute()) else {
                        return Ok(None);
                    };
                    match name.as_str() {
                        Some(name) => session.registry().resolve(name)?,
                        None => return Ok(None),
                    }
                } else {
                    metadata.klass(session.registry())?
                };
                Ok(session.klass_of(class).id_criteria(&id)?.map(Target::One))
            }
            input => one(&metadata, assigned(base, &metadata, input)?),
        }
    }
}

/// Instantiate stored embedded documents; they are persisted iff the base is.
fn embedded_documents(base: &DocumentRef, metadata: &Metadata, items: Vec<Value>) -> Result<Vec<DocumentRef>> {
    let session = base.session();
    let class = metadata.klass(session.registry())?;
    items
        .into_iter()
        .map(|item| match Attributes::from_value(item) {
            Some(attributes) => Ok(DocumentRef::from_parts(
                Rc::clone(&class),
                session.clone(),
                attributes,
                base.is_new_record(),
            )),
            None => Err(metadata.error(
                RelationErrorKind::InvalidTarget,
                "embedded documents are stored as maps",
            )),
        })
        .collect()
}

struct EmbedsMany {
    metadata: Metadata,
    input: Assign,
}

impl Builder for EmbedsMany {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(Value::Array(items)) => {
                Ok(many(Some(embedded_documents(base, &metadata, items)?)))
            }
            input => Ok(many(assigned(base, &metadata, input)?)),
        }
    }
}

struct EmbedsOne {
    metadata: Metadata,
    input: Assign,
}

impl Builder for EmbedsOne {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(raw @ Value::Map(_)) => {
                let docs = embedded_documents(base, &metadata, vec![raw])?;
                Ok(docs.into_iter().next().map(Target::One))
            }
            input => one(&metadata, assigned(base, &metadata, input)?),
        }
    }
}

struct EmbeddedIn {
    metadata: Metadata,
    input: Assign,
}

impl Builder for EmbeddedIn {
    fn build(self: Box<Self>, base: &DocumentRef) -> Result<Option<Target>> {
        let Self { metadata, input } = *self;
        match input {
            Assign::Raw(_) => Ok(base.embedded_parent().map(Target::One)),
            input => one(&metadata, assigned(base, &metadata, input)?),
        }
    }
}

// ============================================================================
// Nested attributes
// ============================================================================

/// How nested attributes may change a relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NestedOptions {
    /// Entries flagged with `_destroy` remove the matching document
    pub allow_destroy: bool,
    /// Maximum number of entries accepted at once
    pub limit: Option<usize>,
}

impl NestedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow_destroy(mut self, allow: bool) -> Self {
        self.allow_destroy = allow;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Applies a list of attribute maps to a relation of a parent document:
/// entries with a known `_id` update (or remove) that document, the rest
/// build new ones. Nothing is saved.
#[derive(Debug, Clone)]
pub struct NestedBuilder {
    metadata: Metadata,
    attributes: Vec<Attributes>,
    options: NestedOptions,
}

impl NestedBuilder {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    #[tracing::instrument(level = "debug", skip_all, fields(relation = %self.metadata.name(), entries = self.attributes.len()))]
    pub fn build(&self, parent: &DocumentRef) -> Result<()> {
        if let Some(limit) = self.options.limit {
            if self.attributes.len() > limit {
                return Err(self.metadata.error(
                    RelationErrorKind::TooManyRecords,
                    format!(
                        "accepts at most {limit} records, got {}",
                        self.attributes.len()
                    ),
                ));
            }
        }
        if self.metadata.is_many() {
            let relation = parent.many(self.metadata.name())?;
            for attributes in &self.attributes {
                self.apply_many(&relation, attributes.clone())?;
            }
        } else if let Some(attributes) = self.attributes.first() {
            self.apply_one(parent, attributes.clone())?;
        }
        Ok(())
    }

    fn apply_many(&self, relation: &ManyRelation, mut attributes: Attributes) -> Result<()> {
        let destroy = take_destroy_flag(&mut attributes);
        let existing = attributes
            .get(ID_FIELD)
            .and_then(|id| relation.target().into_iter().find(|doc| doc.id() == *id));
        match existing {
            Some(doc) if destroy && self.options.allow_destroy => {
                relation.delete(&doc)?;
            }
            Some(doc) => update(&doc, attributes)?,
            None if destroy => {}
            None => {
                relation.build(attributes)?;
            }
        }
        Ok(())
    }

    fn apply_one(&self, parent: &DocumentRef, mut attributes: Attributes) -> Result<()> {
        let destroy = take_destroy_flag(&mut attributes);
        let name = self.metadata.name();
        match parent.one(name)? {
            Some(_) if destroy && self.options.allow_destroy => {
                parent.set_relation(name, Assign::Nil)?;
            }
            Some(doc) if attributes.get(ID_FIELD).is_none_or(|id| *id == doc.id()) => {
                update(&doc, attributes)?;
            }
            _ if destroy => {}
            _ => {
                parent.build_one(name, attributes)?;
            }
        }
        Ok(())
    }
}

fn take_destroy_flag(attributes: &mut Attributes) -> bool {
    attributes
        .remove(DESTROY_FIELD)
        .is_some_and(|flag| flag.is_truthy())
}

fn update(doc: &DocumentRef, attributes: Attributes) -> Result<()> {
    for (field, value) in attributes {
        if field != ID_FIELD {
            doc.set(&field, value)?;
        }
    }
    Ok(())
}
