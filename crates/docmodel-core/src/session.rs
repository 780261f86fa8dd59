//! Sessions and class-level queries.
//!
//! A [`Session`] ties a [`Registry`], a [`Store`] and a [`Config`] together.
//! Documents keep a handle to the session that created them, so relation
//! operations can resolve classes and reach the store without globals.

use std::fmt;
use std::rc::Rc;

use crate::attributes::{Attributes, ID_FIELD, Selector};
use crate::class::DocumentClass;
use crate::config::Config;
use crate::document::DocumentRef;
use crate::error::{Error, NotFoundError, Result};
use crate::registry::Registry;
use crate::store::Store;
use crate::value::Value;

struct SessionInner {
    registry: Registry,
    store: Rc<dyn Store>,
    config: Config,
}

/// Shared handle to a registry, a store and configuration.
#[derive(Clone)]
pub struct Session(Rc<SessionInner>);

impl Session {
    /// Open a session. With `autocreate_indexes` set, indexes for every
    /// indexed relation are created before returning.
    pub fn new(registry: Registry, store: Rc<dyn Store>, config: Config) -> Result<Self> {
        if config.autocreate_indexes {
            for spec in registry.index_specs()? {
                tracing::debug!(collection = %spec.collection, field = %spec.field, "Creating index");
                store.create_index(&spec.collection, &spec.field)?;
            }
        }
        Ok(Self(Rc::new(SessionInner {
            registry,
            store,
            config,
        })))
    }

    pub fn registry(&self) -> &Registry {
        &self.0.registry
    }

    pub fn store(&self) -> &dyn Store {
        self.0.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Class-level query surface for a registered class.
    pub fn klass(&self, name: &str) -> Result<Klass> {
        Ok(self.klass_of(self.registry().resolve(name)?))
    }

    pub(crate) fn klass_of(&self, class: Rc<DocumentClass>) -> Klass {
        Klass {
            class,
            session: self.clone(),
        }
    }

    /// Create a new, unsaved document of a registered class.
    pub fn new_document(&self, class_name: &str, attributes: Attributes) -> Result<DocumentRef> {
        self.klass(class_name)?.new_document(attributes)
    }

    /// Materialize a document that was read from storage.
    pub fn instantiate(&self, class: &Rc<DocumentClass>, attributes: Attributes) -> DocumentRef {
        DocumentRef::instantiate(Rc::clone(class), self.clone(), attributes)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.0.registry)
            .field("config", &self.0.config)
            .finish_non_exhaustive()
    }
}

/// What [`Klass::find`] looks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Find {
    /// Identity lookup
    Id(Value),
    All,
    First,
    Last,
}

/// Result of [`Klass::find`].
#[derive(Debug, Clone)]
pub enum Found {
    One(Option<DocumentRef>),
    Many(Vec<DocumentRef>),
}

impl Found {
    pub fn into_one(self) -> Option<DocumentRef> {
        match self {
            Found::One(doc) => doc,
            Found::Many(docs) => docs.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<DocumentRef> {
        match self {
            Found::One(doc) => doc.into_iter().collect(),
            Found::Many(docs) => docs,
        }
    }
}

/// Queries and bulk operations on one class's collection.
#[derive(Clone)]
pub struct Klass {
    class: Rc<DocumentClass>,
    session: Session,
}

impl Klass {
    pub fn class(&self) -> &Rc<DocumentClass> {
        &self.class
    }

    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn collection(&self) -> &str {
        self.class.collection()
    }

    /// New unsaved document; undeclared attributes are rejected when dynamic
    /// fields are disabled.
    pub fn new_document(&self, attributes: Attributes) -> Result<DocumentRef> {
        DocumentRef::new(Rc::clone(&self.class), self.session.clone(), attributes)
    }

    /// New document, saved immediately. Validation failures leave it unsaved.
    pub fn create(&self, attributes: Attributes) -> Result<DocumentRef> {
        let doc = self.new_document(attributes)?;
        doc.save()?;
        Ok(doc)
    }

    #[tracing::instrument(level = "debug", skip(self, conditions), fields(class = self.name()))]
    pub fn find(&self, find: Find, conditions: Option<Selector>) -> Result<Found> {
        let selector = conditions.unwrap_or_default();
        match find {
            Find::Id(id) => Ok(Found::One(self.find_by_id(&id)?)),
            Find::All => Ok(Found::Many(self.all(&selector)?)),
            Find::First => Ok(Found::One(self.all(&selector)?.into_iter().next())),
            Find::Last => Ok(Found::One(self.all(&selector)?.pop())),
        }
    }

    /// Identity lookup. A miss is an error unless `raise_not_found_error` is
    /// off, in which case it is `None`.
    pub fn find_by_id(&self, id: &Value) -> Result<Option<DocumentRef>> {
        let found = self.id_criteria(id)?;
        if found.is_none() && self.session.config().raise_not_found_error {
            return Err(Error::NotFound(NotFoundError {
                class_name: self.name().to_string(),
                id: id.to_string(),
            }));
        }
        Ok(found)
    }

    /// Identity lookup that never raises.
    pub fn id_criteria(&self, id: &Value) -> Result<Option<DocumentRef>> {
        let selector = Selector::new().eq(ID_FIELD, id.clone());
        Ok(self.all(&selector)?.into_iter().next())
    }

    /// Every document matching `selector`.
    pub fn all(&self, selector: &Selector) -> Result<Vec<DocumentRef>> {
        let records = self.session.store().find(self.collection(), selector)?;
        tracing::trace!(class = self.name(), found = records.len(), "Query executed");
        Ok(records
            .into_iter()
            .map(|attributes| self.session.instantiate(&self.class, attributes))
            .collect())
    }

    pub fn count(&self, selector: &Selector) -> Result<u64> {
        self.session.store().count(self.collection(), selector)
    }

    /// Remove matching documents without loading them.
    #[tracing::instrument(level = "debug", skip(self, conditions), fields(class = self.name()))]
    pub fn delete_all(&self, conditions: Option<Selector>) -> Result<u64> {
        let selector = conditions.unwrap_or_default();
        let deleted = self
            .session
            .store()
            .delete_all(self.collection(), &selector)?;
        tracing::debug!(deleted, "Documents deleted");
        Ok(deleted)
    }

    /// Load and destroy each matching document, running dependent cascades.
    /// Every document is attempted; the first failure is returned afterwards.
    #[tracing::instrument(level = "debug", skip(self, conditions), fields(class = self.name()))]
    pub fn destroy_all(&self, conditions: Option<Selector>) -> Result<u64> {
        let selector = conditions.unwrap_or_default();
        let mut destroyed = 0;
        let mut first_error = None;
        for doc in self.all(&selector)? {
            match doc.destroy() {
                Ok(()) => destroyed += 1,
                Err(e) => {
                    tracing::warn!(id = %doc.id(), error = %e, "Destroy failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        tracing::debug!(destroyed, "Documents destroyed");
        first_error.map_or(Ok(destroyed), Err)
    }
}

impl fmt::Debug for Klass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Klass").field(&self.class.name()).finish()
    }
}
