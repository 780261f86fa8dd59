//! Relations between documents.
//!
//! Every declared relation is described by a [`Metadata`] and, once accessed
//! on a document, represented by a [`Relation`] proxy:
//!
//! - [`ManyRelation`] for `embeds_many`, `references_many` and the
//!   array-of-ids variant
//! - [`OneRelation`] for `embeds_one`, `embedded_in`, `references_one` and
//!   `referenced_in`
//!
//! Proxies are built from a raw attribute value or a user-supplied target by
//! a [`Builder`] and kept consistent with the other side by a [`Binding`].
//! The set of relation kinds is closed; unsupported macros carry metadata
//! but fail when a proxy or builder is requested.

mod binding;
mod builder;
mod kind;
mod many;
mod metadata;
mod one;

use std::rc::Rc;

pub use binding::{Binding, binding_for};
pub use builder::{Builder, DESTROY_FIELD, NestedBuilder, NestedOptions};
pub use kind::{Capabilities, RelationMacro};
pub use many::ManyRelation;
pub use metadata::{Dependent, Metadata, Options, StoredAs};
pub use one::OneRelation;

use crate::attributes::Attributes;
use crate::document::DocumentRef;
use crate::error::{RelationErrorKind, Result};
use crate::session::Klass;

/// Output of a builder: what a relation proxies.
#[derive(Debug, Clone)]
pub enum Target {
    One(DocumentRef),
    Many(Vec<DocumentRef>),
}

impl Target {
    pub fn into_vec(self) -> Vec<DocumentRef> {
        match self {
            Target::One(doc) => vec![doc],
            Target::Many(docs) => docs,
        }
    }
}

/// Operations shared by every relation proxy.
pub trait Proxy {
    /// The document owning this side of the relation.
    fn base(&self) -> Result<DocumentRef>;

    fn metadata(&self) -> Rc<Metadata>;

    /// Current targets, in order.
    fn documents(&self) -> Vec<DocumentRef>;

    /// Establish the inverse side for every target. Unless `building`, new or
    /// changed targets of a persisted base are saved.
    fn bind(&self, building: bool) -> Result<()>;

    /// Break the inverse side for every target; targets the base owns are
    /// deleted when the base is persisted.
    fn unbind(&self) -> Result<()>;

    /// Replace the target. `None` (or an empty sequence) unbinds; the
    /// returned relation is what the owner's slot should hold afterwards.
    fn substitute(&self, target: Option<Target>, building: bool) -> Result<Option<Relation>>;

    /// New related document, bound but not saved.
    fn build(&self, attributes: Attributes) -> Result<DocumentRef>;

    /// New related document, saved when the base is persisted. Validation
    /// failures leave it unsaved.
    fn create(&self, attributes: Attributes) -> Result<DocumentRef>;

    /// Like [`create`](Proxy::create), but a validation failure is an error.
    fn create_strict(&self, attributes: Attributes) -> Result<DocumentRef>;
}

/// A materialized relation on one document.
#[derive(Debug, Clone)]
pub enum Relation {
    Many(ManyRelation),
    One(OneRelation),
}

impl Relation {
    /// Wrap a builder's output. A singular relation given an empty sequence
    /// has no target.
    pub(crate) fn new(
        base: &DocumentRef,
        target: Target,
        metadata: Rc<Metadata>,
    ) -> Result<Option<Relation>> {
        if metadata.is_many() {
            let docs = target.into_vec();
            return Ok(Some(Relation::Many(ManyRelation::new(base, docs, metadata))));
        }
        Ok(single(&metadata, target)?
            .map(|doc| Relation::One(OneRelation::new(base, doc, metadata))))
    }

    pub fn ptr_eq(&self, other: &Relation) -> bool {
        match (self, other) {
            (Relation::Many(a), Relation::Many(b)) => a.ptr_eq(b),
            (Relation::One(a), Relation::One(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn as_many(&self) -> Option<&ManyRelation> {
        match self {
            Relation::Many(many) => Some(many),
            Relation::One(_) => None,
        }
    }

    pub fn as_one(&self) -> Option<&OneRelation> {
        match self {
            Relation::One(one) => Some(one),
            Relation::Many(_) => None,
        }
    }

    fn proxy(&self) -> &dyn Proxy {
        match self {
            Relation::Many(many) => many,
            Relation::One(one) => one,
        }
    }
}

impl Proxy for Relation {
    fn base(&self) -> Result<DocumentRef> {
        self.proxy().base()
    }

    fn metadata(&self) -> Rc<Metadata> {
        self.proxy().metadata()
    }

    fn documents(&self) -> Vec<DocumentRef> {
        self.proxy().documents()
    }

    fn bind(&self, building: bool) -> Result<()> {
        self.proxy().bind(building)
    }

    fn unbind(&self) -> Result<()> {
        self.proxy().unbind()
    }

    fn substitute(&self, target: Option<Target>, building: bool) -> Result<Option<Relation>> {
        self.proxy().substitute(target, building)
    }

    fn build(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.proxy().build(attributes)
    }

    fn create(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.proxy().create(attributes)
    }

    fn create_strict(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.proxy().create_strict(attributes)
    }
}

/// The single document of a target meant for a singular relation.
pub(crate) fn single(metadata: &Metadata, target: Target) -> Result<Option<DocumentRef>> {
    match target {
        Target::One(doc) => Ok(Some(doc)),
        Target::Many(docs) if docs.len() > 1 => Err(metadata.error(
            RelationErrorKind::InvalidTarget,
            format!("expected at most one document, got {}", docs.len()),
        )),
        Target::Many(docs) => Ok(docs.into_iter().next()),
    }
}

/// Class-level query surface of the related class.
pub(crate) fn klass_for(base: &DocumentRef, metadata: &Metadata) -> Result<Klass> {
    let session = base.session();
    let class = metadata.klass(session.registry())?;
    Ok(session.klass_of(class))
}
