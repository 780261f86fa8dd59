//! Documents.
//!
//! A document is shared through [`DocumentRef`], a reference-counted handle:
//! the same document can sit in a parent's collection, be the target of a
//! child's back-pointer and be held by user code at once. Relations that own
//! their targets hold strong handles; back-pointers hold [`WeakDocumentRef`]s.
//!
//! A document read from storage starts in a two-phase state. Raw values of
//! its embedded relations are moved out of the attributes into a pending
//! buffer; the first access to such a relation consumes the raw value and
//! replaces it with live documents (see [`DocumentRef::relation`]).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::attributes::{Attributes, ID_FIELD, Selector};
use crate::class::DocumentClass;
use crate::error::{Error, NotFoundError, RelationError, RelationErrorKind, Result, ValidationError};
use crate::relation::{Dependent, Metadata, Proxy, Relation, RelationMacro};
use crate::session::Session;
use crate::value::Value;

/// Per-relation slot of a document.
///
/// A relation that was never accessed has no slot at all. `Empty` records an
/// explicit absence (the relation was assigned nothing), which the getter
/// returns as-is instead of rebuilding.
#[derive(Debug, Clone)]
pub enum RelationSlot {
    Empty,
    Loaded(Relation),
}

impl RelationSlot {
    pub fn into_relation(self) -> Option<Relation> {
        match self {
            RelationSlot::Empty => None,
            RelationSlot::Loaded(relation) => Some(relation),
        }
    }
}

/// Where an embedded document lives.
struct Embedding {
    parent: WeakDocumentRef,
    metadata: Rc<Metadata>,
    index: usize,
}

pub(crate) struct Document {
    class: Rc<DocumentClass>,
    session: Session,
    attributes: Attributes,
    /// Raw embedded relation values not yet materialized
    pending: Attributes,
    slots: IndexMap<String, RelationSlot>,
    new_record: bool,
    destroyed: bool,
    changed: bool,
    errors: ValidationError,
    embedding: Option<Embedding>,
}

/// Shared handle to a document.
#[derive(Clone)]
pub struct DocumentRef(Rc<RefCell<Document>>);

/// Non-owning handle to a document.
#[derive(Clone, Default)]
pub struct WeakDocumentRef(Weak<RefCell<Document>>);

impl WeakDocumentRef {
    pub fn upgrade(&self) -> Option<DocumentRef> {
        self.0.upgrade().map(DocumentRef)
    }
}

impl fmt::Debug for WeakDocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(doc) => write!(f, "Weak({doc:?})"),
            None => f.write_str("Weak(<dropped>)"),
        }
    }
}

/// Move raw embedded relation values from `attributes` into a pending buffer.
fn split_pending(class: &DocumentClass, attributes: &mut Attributes) -> Attributes {
    let mut pending = Attributes::new();
    for metadata in class
        .relations()
        .filter(|m| m.is_embedded() && m.relation() != RelationMacro::EmbeddedIn)
    {
        if let Some(raw) = attributes.remove(metadata.name()) {
            pending.set(metadata.name(), raw);
        }
    }
    pending
}

impl DocumentRef {
    // ========================================================================
    // Construction
    // ========================================================================

    /// New, unsaved document. Gets a fresh identity unless `_id` is given.
    pub(crate) fn new(
        class: Rc<DocumentClass>,
        session: Session,
        attributes: Attributes,
    ) -> Result<Self> {
        if !session.config().allow_dynamic_fields {
            for field in attributes.keys() {
                let embedded_relation = class.relation(field).is_some_and(|m| m.is_embedded());
                if !embedded_relation && !class.has_field(field) {
                    return Err(unknown_field(&class, field));
                }
            }
        }
        Ok(Self::from_parts(class, session, attributes, true))
    }

    /// Document read from storage.
    pub(crate) fn instantiate(
        class: Rc<DocumentClass>,
        session: Session,
        attributes: Attributes,
    ) -> Self {
        Self::from_parts(class, session, attributes, false)
    }

    pub(crate) fn from_parts(
        class: Rc<DocumentClass>,
        session: Session,
        mut attributes: Attributes,
        new_record: bool,
    ) -> Self {
        if attributes.get(ID_FIELD).is_none_or(Value::is_null) {
            attributes.set(ID_FIELD, Value::new_id());
        }
        let pending = split_pending(&class, &mut attributes);
        Self(Rc::new(RefCell::new(Document {
            class,
            session,
            attributes,
            pending,
            slots: IndexMap::new(),
            new_record,
            destroyed: false,
            changed: false,
            errors: ValidationError::new(),
            embedding: None,
        })))
    }

    // ========================================================================
    // Identity and attributes
    // ========================================================================

    pub fn id(&self) -> Value {
        self.0
            .borrow()
            .attributes
            .get(ID_FIELD)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn class(&self) -> Rc<DocumentClass> {
        Rc::clone(&self.0.borrow().class)
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class.name().to_string()
    }

    pub fn session(&self) -> Session {
        self.0.borrow().session.clone()
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.borrow().attributes.get(field).cloned()
    }

    pub fn attributes(&self) -> Attributes {
        self.0.borrow().attributes.clone()
    }

    /// Write an attribute. Undeclared fields are rejected when dynamic fields
    /// are disabled.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        {
            let doc = self.0.borrow();
            if !doc.session.config().allow_dynamic_fields && !doc.class.has_field(field) {
                return Err(unknown_field(&doc.class, field));
            }
        }
        self.write_attribute(field, value.into());
        Ok(())
    }

    /// Write without the dynamic-field check; used by bindings.
    pub(crate) fn write_attribute(&self, field: &str, value: Value) {
        let mut doc = self.0.borrow_mut();
        if doc.attributes.get(field) != Some(&value) {
            doc.attributes.set(field, value);
            doc.changed = true;
        }
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches(&self.0.borrow().attributes)
    }

    pub fn ptr_eq(&self, other: &DocumentRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakDocumentRef {
        WeakDocumentRef(Rc::downgrade(&self.0))
    }

    // ========================================================================
    // Persistence state
    // ========================================================================

    pub fn is_new_record(&self) -> bool {
        self.0.borrow().new_record
    }

    /// Saved and not deleted since.
    pub fn is_persisted(&self) -> bool {
        let doc = self.0.borrow();
        !doc.new_record && !doc.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.borrow().destroyed
    }

    /// Attributes changed since the document was loaded or last saved.
    pub fn is_changed(&self) -> bool {
        self.0.borrow().changed
    }

    /// Errors from the last validation.
    pub fn errors(&self) -> ValidationError {
        self.0.borrow().errors.clone()
    }

    /// Run the class validators and keep their errors on the document.
    pub fn valid(&self) -> bool {
        let errors = {
            let doc = self.0.borrow();
            doc.class.validate(&doc.attributes)
        };
        let valid = errors.is_empty();
        self.0.borrow_mut().errors = errors;
        valid
    }

    pub(crate) fn mark_destroyed(&self) {
        self.0.borrow_mut().destroyed = true;
    }

    // ========================================================================
    // Embedding
    // ========================================================================

    pub fn is_embedded(&self) -> bool {
        self.0.borrow().embedding.is_some()
    }

    /// Document this one is embedded in.
    pub fn embedded_parent(&self) -> Option<DocumentRef> {
        self.0
            .borrow()
            .embedding
            .as_ref()
            .and_then(|e| e.parent.upgrade())
    }

    /// Position inside the parent's embedded collection.
    pub fn embedded_index(&self) -> Option<usize> {
        self.0.borrow().embedding.as_ref().map(|e| e.index)
    }

    /// Metadata of the parent relation that embeds this document.
    pub fn embedded_metadata(&self) -> Option<Rc<Metadata>> {
        self.0
            .borrow()
            .embedding
            .as_ref()
            .map(|e| Rc::clone(&e.metadata))
    }

    pub(crate) fn set_embedding(&self, parent: &DocumentRef, metadata: Rc<Metadata>) {
        let mut doc = self.0.borrow_mut();
        let index = doc.embedding.as_ref().map_or(0, |e| e.index);
        doc.embedding = Some(Embedding {
            parent: parent.downgrade(),
            metadata,
            index,
        });
    }

    pub(crate) fn set_embedded_index(&self, index: usize) {
        if let Some(embedding) = self.0.borrow_mut().embedding.as_mut() {
            embedding.index = index;
        }
    }

    /// Clear the embedding if it still points at `parent`.
    pub(crate) fn clear_embedding_if(&self, parent: &DocumentRef) {
        let mut doc = self.0.borrow_mut();
        let points_at_parent = doc
            .embedding
            .as_ref()
            .and_then(|e| e.parent.upgrade())
            .is_some_and(|p| p.ptr_eq(parent));
        if points_at_parent {
            doc.embedding = None;
        }
    }

    /// Top-level document whose record stores this one.
    pub(crate) fn root(&self) -> Result<DocumentRef> {
        let mut current = self.clone();
        loop {
            let parent = {
                let doc = current.0.borrow();
                match &doc.embedding {
                    None => None,
                    Some(e) => Some(e.parent.upgrade().ok_or_else(|| {
                        e.metadata.error(
                            RelationErrorKind::BaseDropped,
                            "embedding parent was dropped",
                        )
                    })?),
                }
            };
            match parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
    }

    // ========================================================================
    // Relation slots
    // ========================================================================

    /// The slot for a relation, `None` when it was never accessed.
    pub fn slot(&self, name: &str) -> Option<RelationSlot> {
        self.0.borrow().slots.get(name).cloned()
    }

    /// The relation when already materialized; never triggers a build.
    pub fn loaded_relation(&self, name: &str) -> Option<Relation> {
        match self.0.borrow().slots.get(name) {
            Some(RelationSlot::Loaded(relation)) => Some(relation.clone()),
            _ => None,
        }
    }

    pub(crate) fn put_slot(&self, name: &str, relation: Option<Relation>) {
        let slot = match relation {
            Some(relation) => RelationSlot::Loaded(relation),
            None => RelationSlot::Empty,
        };
        self.0.borrow_mut().slots.insert(name.to_string(), slot);
    }

    /// Consume the raw value of an embedded relation.
    pub(crate) fn take_pending(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().pending.remove(key)
    }

    /// True while an embedded relation's raw value has not been consumed.
    pub fn has_pending(&self, name: &str) -> bool {
        self.0.borrow().pending.contains(name)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Validate and persist. Returns `false`, keeping the errors on the
    /// document, when validation fails. Embedded documents persist through
    /// their root, which must already be saved.
    #[tracing::instrument(level = "debug", skip(self), fields(class = %self.class_name(), id = %self.id()))]
    pub fn save(&self) -> Result<bool> {
        if self.is_destroyed() {
            tracing::debug!("Destroyed documents are not saved");
            return Ok(false);
        }
        if !self.valid() {
            tracing::debug!(errors = %self.errors(), "Validation failed");
            return Ok(false);
        }
        let root = self.root()?;
        if !root.ptr_eq(self) && root.is_new_record() {
            let relation = self
                .embedded_metadata()
                .map_or_else(String::new, |m| m.name().to_string());
            return Err(Error::relation(
                RelationErrorKind::ParentNotPersisted,
                relation,
                "embedded documents can only be saved once their root is saved",
            ));
        }
        root.write_root()?;
        Ok(true)
    }

    /// Like [`save`](Self::save), but a validation failure is an error.
    pub fn save_strict(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::Custom(format!(
                "{} {} was destroyed and cannot be saved",
                self.class_name(),
                self.id()
            )));
        }
        if self.save()? {
            Ok(())
        } else {
            Err(Error::Validation(self.errors()))
        }
    }

    /// Insert or replace this top-level document's record, including every
    /// embedded document.
    pub(crate) fn write_root(&self) -> Result<()> {
        let stored = self.to_stored()?;
        let (session, collection, new_record) = {
            let doc = self.0.borrow();
            (
                doc.session.clone(),
                doc.class.collection().to_string(),
                doc.new_record,
            )
        };
        if new_record {
            session.store().insert(&collection, stored)?;
        } else {
            session.store().update(&collection, &self.id(), stored)?;
        }
        tracing::debug!(collection = %collection, inserted = new_record, "Document written");
        self.mark_saved_tree();
        Ok(())
    }

    fn mark_saved_tree(&self) {
        let embedded = {
            let mut doc = self.0.borrow_mut();
            doc.new_record = false;
            doc.changed = false;
            doc.slots
                .iter()
                .filter(|(name, _)| doc.class.relation(name).is_some_and(|m| owns_embedded(m)))
                .filter_map(|(_, slot)| slot.clone().into_relation())
                .collect::<Vec<_>>()
        };
        for relation in embedded {
            for child in relation.documents() {
                child.mark_saved_tree();
            }
        }
    }

    /// Stored form: attributes plus the content of embedded relations,
    /// materialized or still raw.
    pub(crate) fn to_stored(&self) -> Result<Attributes> {
        let (mut stored, embedded) = {
            let doc = self.0.borrow();
            let embedded = doc
                .class
                .relations()
                .filter(|m| owns_embedded(m))
                .map(|m| {
                    (
                        Rc::clone(m),
                        doc.slots.get(m.name()).cloned(),
                        doc.pending.get(m.name()).cloned(),
                    )
                })
                .collect::<Vec<_>>();
            (doc.attributes.clone(), embedded)
        };
        for (metadata, slot, raw) in embedded {
            let value = match (slot, raw) {
                (Some(RelationSlot::Loaded(relation)), _) => {
                    let children = relation
                        .documents()
                        .iter()
                        .map(|child| child.to_stored().map(Attributes::into_value))
                        .collect::<Result<Vec<_>>>()?;
                    if metadata.is_many() {
                        Value::Array(children)
                    } else {
                        match children.into_iter().next() {
                            Some(child) => child,
                            None => continue,
                        }
                    }
                }
                (Some(RelationSlot::Empty), _) | (None, None) => continue,
                (None, Some(raw)) => raw,
            };
            stored.set(metadata.name(), value);
        }
        Ok(stored)
    }

    /// Remove the document without running dependent cascades. Embedded
    /// documents are detached from their parent and the root is rewritten.
    #[tracing::instrument(level = "debug", skip(self), fields(class = %self.class_name(), id = %self.id()))]
    pub fn delete(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let embedding = self
            .0
            .borrow()
            .embedding
            .as_ref()
            .map(|e| (e.parent.upgrade(), Rc::clone(&e.metadata)));

        if let Some((parent, metadata)) = embedding {
            self.mark_destroyed();
            let Some(parent) = parent else {
                return Ok(());
            };
            match parent.loaded_relation(metadata.name()) {
                Some(Relation::Many(many)) => {
                    many.remove_loaded(self);
                }
                Some(Relation::One(_)) => parent.put_slot(metadata.name(), None),
                None => {}
            }
            self.clear_embedding_if(&parent);
            let root = parent.root()?;
            if root.is_persisted() {
                root.write_root()?;
            }
            return Ok(());
        }

        if !self.is_new_record() {
            let (session, collection) = {
                let doc = self.0.borrow();
                (doc.session.clone(), doc.class.collection().to_string())
            };
            let removed = session.store().remove(&collection, &self.id())?;
            tracing::debug!(removed, "Document removed");
        }
        self.mark_destroyed();
        Ok(())
    }

    /// Apply every relation's `dependent` policy, then delete.
    pub fn destroy(&self) -> Result<()> {
        self.cascade_dependents()?;
        self.delete()
    }

    /// Every cascade is attempted; the first failure is returned afterwards.
    pub(crate) fn cascade_dependents(&self) -> Result<()> {
        let dependents: Vec<Rc<Metadata>> = self
            .class()
            .relations()
            .filter(|m| m.has_dependent() && m.relation().is_supported())
            .cloned()
            .collect();
        let mut first_error = None;
        for metadata in dependents {
            if let Err(e) = self.cascade(&metadata) {
                tracing::warn!(relation = metadata.name(), error = %e, "Dependent cascade failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn cascade(&self, metadata: &Metadata) -> Result<()> {
        let Some(dependent) = metadata.dependent() else {
            return Ok(());
        };
        tracing::trace!(relation = metadata.name(), ?dependent, "Cascading");
        match self.relation(metadata.name())? {
            Some(Relation::Many(many)) => match dependent {
                Dependent::Delete => many.delete_all(None).map(drop),
                Dependent::Destroy => many.destroy_all(None).map(drop),
                Dependent::Nullify => many.nullify(),
            },
            Some(Relation::One(one)) => match (dependent, one.target()) {
                (_, None) => Ok(()),
                (Dependent::Delete, Some(target)) => target.delete(),
                (Dependent::Destroy, Some(target)) => target.destroy(),
                (Dependent::Nullify, Some(_)) => one.nullify(),
            },
            None => Ok(()),
        }
    }

    /// Re-read attributes from the store and forget materialized relations.
    pub fn reload(&self) -> Result<()> {
        if self.is_embedded() {
            return Err(Error::Relation(RelationError::new(
                RelationErrorKind::Unsupported,
                "embedded documents reload through their root",
            )));
        }
        let (session, class) = {
            let doc = self.0.borrow();
            (doc.session.clone(), Rc::clone(&doc.class))
        };
        let id = self.id();
        let selector = Selector::new().eq(ID_FIELD, id.clone());
        let mut attributes = session
            .store()
            .find(class.collection(), &selector)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NotFound(NotFoundError {
                    class_name: class.name().to_string(),
                    id: id.to_string(),
                })
            })?;
        let pending = split_pending(&class, &mut attributes);
        let mut doc = self.0.borrow_mut();
        doc.attributes = attributes;
        doc.pending = pending;
        doc.slots.clear();
        doc.new_record = false;
        doc.destroyed = false;
        doc.changed = false;
        Ok(())
    }
}

/// Embedding relations whose content is stored inside the owner's record.
fn owns_embedded(metadata: &Metadata) -> bool {
    matches!(
        metadata.relation(),
        RelationMacro::EmbedsOne | RelationMacro::EmbedsMany
    )
}

fn unknown_field(class: &DocumentClass, field: &str) -> Error {
    Error::Relation(RelationError::new(
        RelationErrorKind::UnknownField,
        format!("{} has no field '{}'", class.name(), field),
    ))
}

/// Same handle, or same class and identity.
impl PartialEq for DocumentRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.0.borrow(), other.0.borrow());
        a.class.name() == b.class.name()
            && a.attributes.get(ID_FIELD).is_some()
            && a.attributes.get(ID_FIELD) == b.attributes.get(ID_FIELD)
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(doc) => f
                .debug_struct("Document")
                .field("class", &doc.class.name())
                .field("id", &doc.attributes.get(ID_FIELD))
                .field("new_record", &doc.new_record)
                .field("destroyed", &doc.destroyed)
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Document(<borrowed>)"),
        }
    }
}
