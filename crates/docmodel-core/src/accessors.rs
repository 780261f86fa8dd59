//! Relation accessors on documents.
//!
//! Every declared relation gets a getter and a setter on [`DocumentRef`]:
//!
//! - [`DocumentRef::relation`] returns the memoized proxy, building it from
//!   the raw attribute value on first access
//! - [`DocumentRef::set_relation`] substitutes the target of an existing
//!   proxy, or builds a new one
//!
//! [`DocumentRef::many`] and [`DocumentRef::one`] are typed shorthands for
//! the two cardinalities.

use std::rc::Rc;

use crate::attributes::Attributes;
use crate::document::{DocumentRef, RelationSlot};
use crate::error::{Error, RelationErrorKind, Result};
use crate::relation::{ManyRelation, Metadata, Proxy, Relation, klass_for};
use crate::value::Value;

/// Input accepted by relation setters and builders.
#[derive(Debug, Clone)]
pub enum Assign {
    /// No target
    Nil,
    /// Value as stored: a foreign key, an id array, or embedded maps
    Raw(Value),
    Document(DocumentRef),
    Documents(Vec<DocumentRef>),
    /// Build one new document from attributes
    Attributes(Attributes),
    /// Build one new document per entry
    AttributesList(Vec<Attributes>),
}

impl From<DocumentRef> for Assign {
    fn from(doc: DocumentRef) -> Self {
        Assign::Document(doc)
    }
}

impl From<&DocumentRef> for Assign {
    fn from(doc: &DocumentRef) -> Self {
        Assign::Document(doc.clone())
    }
}

impl From<Option<DocumentRef>> for Assign {
    fn from(doc: Option<DocumentRef>) -> Self {
        doc.map_or(Assign::Nil, Assign::Document)
    }
}

impl From<Vec<DocumentRef>> for Assign {
    fn from(docs: Vec<DocumentRef>) -> Self {
        Assign::Documents(docs)
    }
}

impl From<&[DocumentRef]> for Assign {
    fn from(docs: &[DocumentRef]) -> Self {
        Assign::Documents(docs.to_vec())
    }
}

impl From<Attributes> for Assign {
    fn from(attributes: Attributes) -> Self {
        Assign::Attributes(attributes)
    }
}

impl From<Vec<Attributes>> for Assign {
    fn from(list: Vec<Attributes>) -> Self {
        Assign::AttributesList(list)
    }
}

impl From<Value> for Assign {
    fn from(value: Value) -> Self {
        Assign::Raw(value)
    }
}

impl DocumentRef {
    fn relation_metadata(&self, name: &str) -> Result<Rc<Metadata>> {
        self.class().relation(name).cloned().ok_or_else(|| {
            Error::relation(
                RelationErrorKind::UnknownRelation,
                name,
                format!("{} declares no relation '{name}'", self.class_name()),
            )
        })
    }

    /// The relation proxy, or `None` when the relation has no target.
    ///
    /// The first call builds the proxy from the raw value under the
    /// relation's key and binds it; later calls return the same proxy until
    /// the setter replaces it. Raw embedded values are consumed by the build.
    pub fn relation(&self, name: &str) -> Result<Option<Relation>> {
        let metadata = self.relation_metadata(name)?;
        if let Some(slot) = self.slot(name) {
            return Ok(slot.into_relation());
        }
        let key = metadata.key()?;
        let raw = if metadata.is_embedded() {
            self.take_pending(&key)
        } else {
            self.get(&key)
        };
        tracing::trace!(class = %self.class_name(), relation = name, "Building relation");
        self.build_relation(&metadata, Assign::Raw(raw.unwrap_or(Value::Null)), false)
    }

    /// Build, memoize and bind a fresh proxy. The slot is filled before
    /// binding so bindings that reach back see the new proxy.
    fn build_relation(
        &self,
        metadata: &Rc<Metadata>,
        input: Assign,
        building: bool,
    ) -> Result<Option<Relation>> {
        let relation = match metadata.builder(input)?.build(self)? {
            Some(target) => Relation::new(self, target, Rc::clone(metadata))?,
            None => None,
        };
        self.put_slot(metadata.name(), relation.clone());
        if let Some(relation) = &relation {
            relation.bind(building)?;
        }
        Ok(relation)
    }

    /// Assign a relation's target. An existing proxy substitutes its target
    /// (and `Nil` unbinds it); otherwise a new proxy is built.
    pub fn set_relation(&self, name: &str, value: impl Into<Assign>) -> Result<Option<Relation>> {
        self.assign(name, value.into(), false)
    }

    fn assign(&self, name: &str, value: Assign, building: bool) -> Result<Option<Relation>> {
        let metadata = self.relation_metadata(name)?;
        if let Some(RelationSlot::Loaded(relation)) = self.slot(name) {
            let target = metadata.builder(value)?.build(self)?;
            let next = relation.substitute(target, building)?;
            self.put_slot(name, next.clone());
            return Ok(next);
        }
        if metadata.is_embedded() {
            // A raw value nobody read is superseded.
            self.take_pending(&metadata.key()?);
        }
        self.build_relation(&metadata, value, building)
    }

    /// Whether the relation has a materialized proxy.
    pub fn relation_exists(&self, name: &str) -> bool {
        matches!(self.slot(name), Some(RelationSlot::Loaded(_)))
    }

    /// The proxy of a sequence relation.
    pub fn many(&self, name: &str) -> Result<ManyRelation> {
        match self.relation(name)? {
            Some(Relation::Many(many)) => Ok(many),
            _ => Err(Error::relation(
                RelationErrorKind::InvalidTarget,
                name,
                "not a sequence relation",
            )),
        }
    }

    /// The target of a singular relation.
    pub fn one(&self, name: &str) -> Result<Option<DocumentRef>> {
        let metadata = self.relation_metadata(name)?;
        if metadata.is_many() {
            return Err(metadata.error(RelationErrorKind::InvalidTarget, "not a singular relation"));
        }
        Ok(match self.relation(name)? {
            Some(Relation::One(one)) => one.target(),
            _ => None,
        })
    }

    /// Build a new target for a singular relation without saving it.
    pub fn build_one(&self, name: &str, attributes: Attributes) -> Result<DocumentRef> {
        let metadata = self.relation_metadata(name)?;
        if metadata.is_many() {
            return Err(metadata.error(
                RelationErrorKind::InvalidTarget,
                "sequence relations build through their proxy",
            ));
        }
        let doc = klass_for(self, &metadata)?.new_document(attributes)?;
        self.assign(name, Assign::Document(doc.clone()), true)?;
        Ok(doc)
    }

    /// Build a new target for a singular relation, saved when this document
    /// is persisted.
    pub fn create_one(&self, name: &str, attributes: Attributes) -> Result<DocumentRef> {
        self.create_one_with(name, attributes, false)
    }

    /// Like [`create_one`](Self::create_one), but a validation failure is an
    /// error.
    pub fn create_one_strict(&self, name: &str, attributes: Attributes) -> Result<DocumentRef> {
        self.create_one_with(name, attributes, true)
    }

    fn create_one_with(&self, name: &str, attributes: Attributes, strict: bool) -> Result<DocumentRef> {
        let doc = self.build_one(name, attributes)?;
        if let Some(Relation::One(one)) = self.relation(name)? {
            one.persist(&doc, strict)?;
        }
        Ok(doc)
    }
}
