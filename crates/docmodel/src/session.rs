//! Session construction.
//!
//! [`SessionBuilder`] collects class declarations, configuration and a store,
//! then builds the registry (resolving every relation) and opens the
//! [`Session`].
//!
//! # Example
//!
//! ```rust
//! use docmodel::prelude::*;
//!
//! let session = SessionBuilder::new()
//!     .class(DocumentClass::builder("Person").references_many("posts", Options::new()))
//!     .class(DocumentClass::builder("Post").referenced_in("person", Options::new()))
//!     .build()
//!     .unwrap();
//! assert!(session.klass("Post").is_ok());
//! ```

use std::fmt;
use std::rc::Rc;

use docmodel_core::{Config, DocumentClass, DocumentClassBuilder, Registry, Result, Session, Store};
use docmodel_memory::MemoryStore;

/// Builder for [`Session`] with a fluent API.
///
/// Without an explicit store the session uses a fresh [`MemoryStore`].
#[derive(Default)]
pub struct SessionBuilder {
    classes: Vec<DocumentClass>,
    config: Config,
    store: Option<Rc<dyn Store>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class.
    #[must_use]
    pub fn class(mut self, class: DocumentClassBuilder) -> Self {
        self.classes.push(class.build());
        self
    }

    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from JSON; missing keys keep their defaults.
    pub fn config_json(mut self, json: &str) -> Result<Self> {
        self.config = Config::from_json(json)?;
        Ok(self)
    }

    #[must_use]
    pub fn store(mut self, store: Rc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the registry and open the session.
    ///
    /// Fails when a relation names an unregistered class, when a class is
    /// declared twice, or when index creation fails.
    pub fn build(self) -> Result<Session> {
        let registry = self
            .classes
            .into_iter()
            .fold(Registry::builder(), |builder, class| builder.register(class))
            .build()?;
        let store: Rc<dyn Store> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        tracing::debug!(
            classes = registry.classes().count(),
            autocreate_indexes = self.config.autocreate_indexes,
            "Opening session"
        );
        Session::new(registry, store, self.config)
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field(
                "classes",
                &self.classes.iter().map(DocumentClass::name).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
