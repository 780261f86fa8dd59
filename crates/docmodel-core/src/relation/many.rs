//! Proxy for relations whose target is a sequence.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::attributes::{Attributes, ID_FIELD, Selector};
use crate::document::{DocumentRef, WeakDocumentRef};
use crate::error::{Error, NotFoundError, RelationErrorKind, Result};
use crate::relation::binding::stored_ids;
use crate::relation::{Binding, Metadata, Proxy, Relation, RelationMacro, Target, binding_for, klass_for};
use crate::session::{Find, Found, Klass};
use crate::value::Value;

struct ManyState {
    base: WeakDocumentRef,
    target: Vec<DocumentRef>,
    metadata: Rc<Metadata>,
    /// Set while documents are added without saving
    building: bool,
}

/// Sequence relation: `embeds_many`, `references_many` or its
/// array-of-ids variant.
///
/// Cloning yields another handle to the same proxy.
#[derive(Clone)]
pub struct ManyRelation(Rc<RefCell<ManyState>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Delete,
    Destroy,
}

impl ManyRelation {
    pub(crate) fn new(base: &DocumentRef, target: Vec<DocumentRef>, metadata: Rc<Metadata>) -> Self {
        Self(Rc::new(RefCell::new(ManyState {
            base: base.downgrade(),
            target,
            metadata,
            building: false,
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

    pub fn target(&self) -> Vec<DocumentRef> {
        self.0.borrow().target.clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().target.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DocumentRef> {
        self.0.borrow().target.get(index).cloned()
    }

    pub fn first(&self) -> Option<DocumentRef> {
        self.0.borrow().target.first().cloned()
    }

    pub fn last(&self) -> Option<DocumentRef> {
        self.0.borrow().target.last().cloned()
    }

    pub fn contains(&self, doc: &DocumentRef) -> bool {
        self.0.borrow().target.iter().any(|d| d == doc)
    }

    pub fn ptr_eq(&self, other: &ManyRelation) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_building(&self) -> bool {
        self.0.borrow().building
    }

    /// Run `f` with saving suspended, restoring the previous mode afterwards.
    pub fn building<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let previous = std::mem::replace(&mut self.0.borrow_mut().building, true);
        let result = f();
        self.0.borrow_mut().building = previous;
        result
    }

    fn klass(&self) -> Result<Klass> {
        klass_for(&self.base()?, &self.metadata())
    }

    fn is_embedded(&self) -> bool {
        self.0.borrow().metadata.is_embedded()
    }

    /// Selector restricting a query to this relation's documents.
    fn scope(&self, base: &DocumentRef) -> Result<Selector> {
        let metadata = self.metadata();
        if metadata.relation() == RelationMacro::ReferencesManyAsArray {
            let ids = stored_ids(base, &metadata.foreign_key()?);
            return Ok(Selector::new().any_in(ID_FIELD, ids));
        }
        let mut selector = Selector::new().eq(metadata.foreign_key()?, base.id());
        if metadata.as_role().is_some() {
            selector = selector.eq(metadata.type_attribute(), base.class_name());
        }
        Ok(selector)
    }

    // ========================================================================
    // Adding documents
    // ========================================================================

    /// Append documents. Each one is bound, added unless already present,
    /// and saved when the base is persisted. Every document is attempted;
    /// the first failure is returned afterwards.
    pub fn append(&self, documents: &[DocumentRef]) -> Result<()> {
        let base = self.base()?;
        let metadata = self.metadata();
        let binding = binding_for(&metadata)?;
        tracing::debug!(
            relation = metadata.name(),
            count = documents.len(),
            persisted = base.is_persisted(),
            "Appending documents"
        );
        let mut first_error = None;
        for doc in documents {
            if let Err(e) = self.append_one(&base, doc, binding, &metadata) {
                tracing::warn!(relation = metadata.name(), id = %doc.id(), error = %e, "Append failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn push(&self, doc: &DocumentRef) -> Result<()> {
        self.append(std::slice::from_ref(doc))
    }

    pub fn concat(&self, documents: &[DocumentRef]) -> Result<()> {
        self.append(documents)
    }

    fn append_one(
        &self,
        base: &DocumentRef,
        doc: &DocumentRef,
        binding: &dyn Binding,
        metadata: &Rc<Metadata>,
    ) -> Result<()> {
        binding.bind_one(base, doc, metadata)?;
        self.push_loaded(doc);
        if base.is_persisted() && !self.is_building() {
            self.persist(base, doc, false)?;
        }
        Ok(())
    }

    /// Save `doc` for the relation; the array variant also saves the base,
    /// which holds the ids.
    fn persist(&self, base: &DocumentRef, doc: &DocumentRef, strict: bool) -> Result<bool> {
        let saved = if strict {
            doc.save_strict()?;
            true
        } else {
            doc.save()?
        };
        if saved && self.metadata().relation() == RelationMacro::ReferencesManyAsArray {
            base.save()?;
        }
        Ok(saved)
    }

    /// Add to the in-memory target without binding or saving.
    pub(crate) fn push_loaded(&self, doc: &DocumentRef) {
        let embedded = {
            let mut state = self.0.borrow_mut();
            if !state.target.iter().any(|d| d == doc) {
                state.target.push(doc.clone());
            }
            state.metadata.is_embedded()
        };
        if embedded {
            self.reindex();
        }
    }

    /// Drop from the in-memory target without unbinding or saving.
    pub(crate) fn remove_loaded(&self, doc: &DocumentRef) -> bool {
        let (removed, embedded) = {
            let mut state = self.0.borrow_mut();
            let before = state.target.len();
            state.target.retain(|d| d != doc);
            (state.target.len() != before, state.metadata.is_embedded())
        };
        if removed && embedded {
            self.reindex();
        }
        removed
    }

    fn reindex(&self) {
        for (index, doc) in self.target().iter().enumerate() {
            doc.set_embedded_index(index);
        }
    }

    /// Bind every target. Unless building, new or changed targets of a
    /// persisted base are saved.
    pub fn bind(&self, building: bool) -> Result<()> {
        let base = self.base()?;
        let metadata = self.metadata();
        let target = self.target();
        binding_for(&metadata)?.bind(&base, &target, &metadata)?;
        if metadata.is_embedded() {
            self.reindex();
        }
        if building || self.is_building() || !base.is_persisted() {
            return Ok(());
        }
        let mut first_error = None;
        for doc in target.iter().filter(|d| d.is_new_record() || d.is_changed()) {
            if let Err(e) = doc.save() {
                tracing::warn!(relation = metadata.name(), id = %doc.id(), error = %e, "Save failed");
                first_error.get_or_insert(e);
            }
        }
        if metadata.relation() == RelationMacro::ReferencesManyAsArray && base.is_changed() {
            if let Err(e) = base.save() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn build(&self, attributes: Attributes) -> Result<DocumentRef> {
        let doc = self.klass()?.new_document(attributes)?;
        self.building(|| self.push(&doc))?;
        Ok(doc)
    }

    pub fn create(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.create_with(attributes, false)
    }

    pub fn create_strict(&self, attributes: Attributes) -> Result<DocumentRef> {
        self.create_with(attributes, true)
    }

    fn create_with(&self, attributes: Attributes, strict: bool) -> Result<DocumentRef> {
        let doc = self.build(attributes)?;
        let base = self.base()?;
        if base.is_persisted() {
            self.persist(&base, &doc, strict)?;
        }
        Ok(doc)
    }

    // ========================================================================
    // Removing documents
    // ========================================================================

    /// Remove matching documents without running their cascades.
    pub fn delete_all(&self, conditions: Option<Selector>) -> Result<u64> {
        self.remove_all(conditions, Removal::Delete)
    }

    /// Remove matching documents, running their dependent cascades.
    pub fn destroy_all(&self, conditions: Option<Selector>) -> Result<u64> {
        self.remove_all(conditions, Removal::Destroy)
    }

    /// The in-memory target and the store are filtered independently: the
    /// conditions drop matching loaded documents, and the store removes the
    /// matching documents this relation owns. The count is the store's,
    /// except for embedded relations, which live entirely in memory.
    #[tracing::instrument(level = "debug", skip(self, conditions))]
    fn remove_all(&self, conditions: Option<Selector>, removal: Removal) -> Result<u64> {
        let selector = conditions.unwrap_or_default();
        let base = self.base()?;
        let metadata = self.metadata();
        let removed: Vec<DocumentRef> = {
            let mut state = self.0.borrow_mut();
            let (removed, kept) = std::mem::take(&mut state.target)
                .into_iter()
                .partition(|d| d.matches(&selector));
            state.target = kept;
            removed
        };

        if metadata.is_embedded() {
            self.reindex();
            for doc in &removed {
                if removal == Removal::Destroy {
                    doc.cascade_dependents()?;
                }
                doc.clear_embedding_if(&base);
                doc.mark_destroyed();
            }
            if base.is_persisted() {
                base.root()?.write_root()?;
            }
            return Ok(removed.len() as u64);
        }

        let klass = self.klass()?;
        if metadata.relation() == RelationMacro::ReferencesManyAsArray {
            return self.remove_from_array(&base, &klass, selector, &removed, removal);
        }
        let scoped = selector.merge(self.scope(&base)?);
        match removal {
            Removal::Delete => klass.delete_all(Some(scoped)),
            Removal::Destroy => klass.destroy_all(Some(scoped)),
        }
    }

    fn remove_from_array(
        &self,
        base: &DocumentRef,
        klass: &Klass,
        selector: Selector,
        removed: &[DocumentRef],
        removal: Removal,
    ) -> Result<u64> {
        let metadata = self.metadata();
        let key = metadata.foreign_key()?;
        let mut ids: Vec<Value> = klass
            .all(&selector.clone().merge(self.scope(base)?))?
            .iter()
            .map(DocumentRef::id)
            .collect();
        ids.extend(removed.iter().map(DocumentRef::id));

        let mut remaining = stored_ids(base, &key);
        remaining.retain(|id| !ids.contains(id));
        base.write_attribute(&key, Value::Array(remaining));

        let scoped = selector.merge(Selector::new().any_in(ID_FIELD, ids));
        let count = match removal {
            Removal::Delete => klass.delete_all(Some(scoped))?,
            Removal::Destroy => klass.destroy_all(Some(scoped))?,
        };
        if base.is_persisted() {
            base.save()?;
        }
        Ok(count)
    }

    /// Remove one document from the relation, deleting it when the base is
    /// persisted. Returns `false` when it was not part of the target.
    pub fn delete(&self, doc: &DocumentRef) -> Result<bool> {
        if !self.remove_loaded(doc) {
            return Ok(false);
        }
        let base = self.base()?;
        let metadata = self.metadata();
        binding_for(&metadata)?.unbind_one(&base, doc, &metadata)?;
        if base.is_persisted() {
            self.delete_disowned(&base, std::slice::from_ref(doc))?;
        }
        Ok(true)
    }

    /// Clear the target. Documents the base owned are deleted when the base
    /// is persisted; otherwise they are only orphaned.
    pub fn unbind(&self) -> Result<()> {
        let base = self.base()?;
        let metadata = self.metadata();
        let target = std::mem::take(&mut self.0.borrow_mut().target);
        tracing::debug!(relation = metadata.name(), count = target.len(), "Unbinding relation");
        binding_for(&metadata)?.unbind(&base, &target, &metadata)?;
        if !base.is_persisted() {
            return Ok(());
        }
        self.delete_disowned(&base, &target)
    }

    fn delete_disowned(&self, base: &DocumentRef, docs: &[DocumentRef]) -> Result<()> {
        let metadata = self.metadata();
        if metadata.is_embedded() {
            for doc in docs {
                doc.mark_destroyed();
            }
            return base.root()?.write_root();
        }
        let mut first_error = None;
        for doc in docs {
            if let Err(e) = doc.delete() {
                tracing::warn!(relation = metadata.name(), id = %doc.id(), error = %e, "Delete failed");
                first_error.get_or_insert(e);
            }
        }
        if metadata.relation() == RelationMacro::ReferencesManyAsArray {
            if let Err(e) = base.save() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Unbind every target and save them, keeping the documents.
    pub(crate) fn nullify(&self) -> Result<()> {
        let base = self.base()?;
        let metadata = self.metadata();
        let target = std::mem::take(&mut self.0.borrow_mut().target);
        binding_for(&metadata)?.unbind(&base, &target, &metadata)?;
        let mut first_error = None;
        for doc in target.iter().filter(|d| !d.is_new_record()) {
            if let Err(e) = doc.save() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Replace the target. `None` or an empty sequence unbinds; otherwise
    /// documents no longer present are unbound in memory and the new ones
    /// are bound.
    pub fn substitute(&self, target: Option<Vec<DocumentRef>>, building: bool) -> Result<()> {
        let Some(docs) = target.filter(|docs| !docs.is_empty()) else {
            return self.unbind();
        };
        let base = self.base()?;
        let metadata = self.metadata();
        let mut next: Vec<DocumentRef> = Vec::with_capacity(docs.len());
        for doc in docs {
            if !next.contains(&doc) {
                next.push(doc);
            }
        }
        let previous = std::mem::replace(&mut self.0.borrow_mut().target, next.clone());
        let dropped: Vec<DocumentRef> = previous.into_iter().filter(|d| !next.contains(d)).collect();
        binding_for(&metadata)?.unbind(&base, &dropped, &metadata)?;
        self.bind(building)?;
        if metadata.is_embedded() && base.is_persisted() && !building {
            // The root record still holds the dropped documents.
            for doc in &dropped {
                doc.mark_destroyed();
            }
            base.root()?.write_root()?;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Find within the relation. `Find::Id` is an identity lookup on the
    /// related class; the other modes are scoped to this relation. Embedded
    /// relations are searched in memory.
    pub fn find(&self, find: Find, conditions: Option<Selector>) -> Result<Found> {
        if self.is_embedded() {
            return self.find_embedded(find, conditions);
        }
        let klass = self.klass()?;
        match find {
            Find::Id(id) => Ok(Found::One(klass.find_by_id(&id)?)),
            other => {
                let base = self.base()?;
                let selector = conditions.unwrap_or_default().merge(self.scope(&base)?);
                klass.find(other, Some(selector))
            }
        }
    }

    fn find_embedded(&self, find: Find, conditions: Option<Selector>) -> Result<Found> {
        let target = self.target();
        if let Find::Id(id) = &find {
            let found = target.into_iter().find(|d| d.id() == *id);
            let metadata = self.metadata();
            if found.is_none() && self.base()?.session().config().raise_not_found_error {
                return Err(Error::NotFound(NotFoundError {
                    class_name: metadata.class_name(),
                    id: id.to_string(),
                }));
            }
            return Ok(Found::One(found));
        }
        let selector = conditions.unwrap_or_default();
        let mut matching: Vec<DocumentRef> =
            target.into_iter().filter(|d| d.matches(&selector)).collect();
        Ok(match find {
            Find::First => Found::One(matching.into_iter().next()),
            Find::Last => Found::One(matching.pop()),
            Find::All | Find::Id(_) => Found::Many(matching),
        })
    }

    /// Number of stored documents in the relation; embedded relations count
    /// the loaded target.
    pub fn count(&self) -> Result<u64> {
        if self.is_embedded() {
            return Ok(self.len() as u64);
        }
        let base = self.base()?;
        self.klass()?.count(&self.scope(&base)?)
    }
}

impl Proxy for ManyRelation {
    fn base(&self) -> Result<DocumentRef> {
        self.base()
    }

    fn metadata(&self) -> Rc<Metadata> {
        self.metadata()
    }

    fn documents(&self) -> Vec<DocumentRef> {
        self.target()
    }

    fn bind(&self, building: bool) -> Result<()> {
        self.bind(building)
    }

    fn unbind(&self) -> Result<()> {
        self.unbind()
    }

    fn substitute(&self, target: Option<Target>, building: bool) -> Result<Option<Relation>> {
        self.substitute(target.map(Target::into_vec), building)?;
        Ok(Some(Relation::Many(self.clone())))
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

impl fmt::Debug for ManyRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(state) => f
                .debug_struct("ManyRelation")
                .field("relation", &state.metadata.name())
                .field("target", &state.target)
                .field("building", &state.building)
                .finish(),
            Err(_) => f.write_str("ManyRelation(<borrowed>)"),
        }
    }
}
