//! Proxy for relations with at most one target.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::attributes::Attributes;
use crate::document::{DocumentRef, WeakDocumentRef};
use crate::error::{RelationErrorKind, Result};
use crate::relation::{Metadata, Proxy, Relation, RelationMacro, Target, binding_for, klass_for, single};

/// A child pointing at its parent must not keep the parent alive while the
/// parent keeps the child: such links are weak.
#[derive(Clone)]
enum Link {
    Strong(DocumentRef),
    Weak(WeakDocumentRef),
}

struct OneState {
    base: WeakDocumentRef,
    target: Link,
    metadata: Rc<Metadata>,
}

/// Singular relation: `embeds_one`, `embedded_in`, `references_one` or
/// `referenced_in`.
#[derive(Clone)]
pub struct OneRelation(Rc<RefCell<OneState>>);

impl OneRelation {
    pub(crate) fn new(base: &DocumentRef, target: DocumentRef, metadata: Rc<Metadata>) -> Self {
        Self(Rc::new(RefCell::new(OneState {
            base: base.downgrade(),
            target: Link::Strong(target),
            metadata,
        })))
    }

    /// Inverse relation set by a binding; `target` already owns `base`.
    pub(crate) fn back_link(base: &DocumentRef, target: &DocumentRef, metadata: Rc<Metadata>) -> Self {
        Self(Rc::new(RefCell::new(OneState {
            base: base.downgrade(),
            target: Link::Weak(target.downgrade()),
            metadata,
        })))
    }

    pub fn base(&self) -> Result<DocumentRef> {
        let state = self.0.borrow();
        state.base.upgrade().ok_or_else(|| {
            state
                .metadata
                .error(RelationErrorKind::BaseDropped, "the owning document was dropped")
        })
    }

    pub fn metadata(&self) -> Rc<Metadata> {
        Rc::clone(&self.0.borrow().metadata)
    }

    /// The target, if it is still alive.
    pub fn target(&self) -> Option<DocumentRef> {
        match &self.0.borrow().target {
            Link::Strong(doc) => Some(doc.clone()),
            Link::Weak(doc) => doc.upgrade(),
        }
    }

    pub fn ptr_eq(&self, other: &OneRelation) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn points_at(&self, doc: &DocumentRef) -> bool {
        self.target().is_some_and(|target| target.ptr_eq(doc))
    }

    /// Weaken the link when `target` is a parent already holding `base`.
    fn settle_link(&self, base: &DocumentRef, target: &DocumentRef, metadata: &Metadata) {
        if !matches!(
            metadata.relation(),
            RelationMacro::ReferencedIn | RelationMacro::EmbeddedIn
        ) {
            return;
        }
        let Some(inverse) = metadata.inverse_metadata(&target.class()) else {
            return;
        };
        let held = target
            .loaded_relation(inverse.name())
            .is_some_and(|relation| relation.documents().iter().any(|d| d.ptr_eq(base)));
        if held {
            self.0.borrow_mut().target = Link::Weak(target.downgrade());
        }
    }

    pub fn bind(&self, building: bool) -> Result<()> {
        let Some(target) = self.target() else {
            return Ok(());
        };
        let base = self.base()?;
        let metadata = self.metadata();
        binding_for(&metadata)?.bind_one(&base, &target, &metadata)?;
        self.settle_link(&base, &target, &metadata);
        if building || !base.is_persisted() {
            return Ok(());
        }
        let owned = matches!(
            metadata.relation(),
            RelationMacro::ReferencesOne | RelationMacro::EmbedsOne
        );
        if owned && (target.is_new_record() || target.is_changed()) {
            target.save()?;
        }
        Ok(())
    }

    /// Break the link. A target owned by a persisted base is deleted.
    pub fn unbind(&self) -> Result<()> {
        let Some(target) = self.target() else {
            return Ok(());
        };
        let base = self.base()?;
        let metadata = self.metadata();
        binding_for(&metadata)?.unbind_one(&base, &target, &metadata)?;
        if base.is_persisted() && metadata.relation().is_owning() {
            self.delete_disowned(&base, &target, &metadata)?;
        }
        Ok(())
    }

    fn delete_disowned(&self, base: &DocumentRef, target: &DocumentRef, metadata: &Metadata) -> Result<()> {
        tracing::debug!(relation = metadata.name(), id = %target.id(), "Deleting disowned document");
        if metadata.is_embedded() {
            target.mark_destroyed();
            base.root()?.write_root()
        } else {
            target.delete()
        }
    }

    /// Clear the link for a `nullify` cascade and save the other side.
    pub(crate) fn nullify(&self) -> Result<()> {
        let Some(target) = self.target() else {
            return Ok(());
        };
        let base = self.base()?;
        let metadata = self.metadata();
        binding_for(&metadata)?.unbind_one(&base, &target, &metadata)?;
        if !target.is_new_record() {
            target.save()?;
        }
        Ok(())
    }

    /// Replace the target; `None` unbinds. Returns the relation the owner's
    /// slot should hold.
    pub fn substitute(&self, target: Option<DocumentRef>, building: bool) -> Result<Option<OneRelation>> {
        let Some(doc) = target else {
            self.unbind()?;
            return Ok(None);
        };
        let base = self.base()?;
        let metadata = self.metadata();
        if let Some(previous) = self.target().filter(|previous| !previous.ptr_eq(&doc)) {
            binding_for(&metadata)?.unbind_one(&base, &previous, &metadata)?;
            if metadata.is_embedded() && metadata.relation().is_owning() && base.is_persisted() {
                previous.mark_destroyed();
            }
        }
        self.0.borrow_mut().target = Link::Strong(doc);
        self.bind(building)?;
        Ok(Some(self.clone()))
    }

    pub fn build(&self, attributes: Attributes) -> Result<DocumentRef> {
        let doc = klass_for(&self.base()?, &self.metadata())?.new_document(attributes)?;
        self.substitute(Some(doc.clone()), true)?;
        Ok(doc)
    }

    pub fn create(&self, attributes: Attributes) -> Result<DocumentRef> {
        let doc = self.build(attributes)?;
        self.persist(&doc, false)?;
        Ok(doc)
    }

    pub fn create_strict(&self, attributes: Attributes) -> Result<DocumentRef> {
        let doc = self.build(attributes)?;
        self.persist(&doc, true)?;
        Ok(doc)
    }

    /// Save a freshly built target when the base is persisted. A parent
    /// created from the child side also resaves the child, which holds the
    /// key.
    pub(crate) fn persist(&self, doc: &DocumentRef, strict: bool) -> Result<bool> {
        let base = self.base()?;
        if !base.is_persisted() {
            return Ok(false);
        }
        let saved = if strict {
            doc.save_strict()?;
            true
        } else {
            doc.save()?
        };
        if saved && self.metadata().relation() == RelationMacro::ReferencedIn {
            base.save()?;
        }
        Ok(saved)
    }
}

impl Proxy for OneRelation {
    fn base(&self) -> Result<DocumentRef> {
        self.base()
    }

    fn metadata(&self) -> Rc<Metadata> {
        self.metadata()
    }

    fn documents(&self) -> Vec<DocumentRef> {
        self.target().into_iter().collect()
    }

    fn bind(&self, building: bool) -> Result<()> {
        self.bind(building)
    }

    fn unbind(&self) -> Result<()> {
        self.unbind()
    }

    fn substitute(&self, target: Option<Target>, building: bool) -> Result<Option<Relation>> {
        let metadata = self.metadata();
        let doc = match target {
            Some(target) => single(&metadata, target)?,
            None => None,
        };
        Ok(self.substitute(doc, building)?.map(Relation::One))
    }

    fn build(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.build(attributes)
    }

    fn create(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.create(attributes)
    }

    fn create_strict(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.create_strict(attributes)
    }
}

impl fmt::Debug for OneRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(state) => {
                let weak = matches!(state.target, Link::Weak(_));
                f.debug_struct("OneRelation")
                    .field("relation", &state.metadata.name())
                    .field("weak", &weak)
                    .finish_non_exhaustive()
            }
            Err(_) => f.write_str("OneRelation(<borrowed>)"),
        }
    }
}
