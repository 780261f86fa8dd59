//! Class registry.
//!
//! Maps class names to [`DocumentClass`] descriptors. The registry is built
//! once, before any document exists, and [`RegistryBuilder::build`] resolves
//! every declared relation eagerly so a misspelled class name fails at
//! startup rather than on first access.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::class::DocumentClass;
use crate::error::{ConfigError, Error, ResolutionError, Result};
use crate::relation::RelationMacro;

/// An index the store should maintain for an indexed relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: String,
    pub field: String,
}

/// Immutable name-to-class mapping shared by a session.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: Rc<IndexMap<String, Rc<DocumentClass>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Resolve a class name.
    pub fn resolve(&self, name: &str) -> Result<Rc<DocumentClass>> {
        self.classes.get(name).cloned().ok_or_else(|| {
            Error::Resolution(ResolutionError {
                class_name: name.to_string(),
                referenced_from: None,
            })
        })
    }

    pub fn get(&self, name: &str) -> Option<&Rc<DocumentClass>> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Rc<DocumentClass>> {
        self.classes.values()
    }

    /// Indexes for every relation declared with `index: true`.
    pub fn index_specs(&self) -> Result<Vec<IndexSpec>> {
        let mut specs = Vec::new();
        for class in self.classes.values() {
            for metadata in class.relations().filter(|m| m.is_indexed()) {
                if metadata.is_embedded() {
                    continue;
                }
                let collection = if metadata.stores_foreign_key() {
                    class.collection().to_string()
                } else {
                    metadata.klass(self)?.collection().to_string()
                };
                let spec = IndexSpec {
                    collection,
                    field: metadata.foreign_key()?,
                };
                if !specs.contains(&spec) {
                    specs.push(spec);
                }
            }
        }
        Ok(specs)
    }
}

/// Collects classes and validates them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: Vec<DocumentClass>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn register(mut self, class: DocumentClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Validate and freeze the registry.
    ///
    /// Every `class_name` and `inverse_class_name` must name a registered
    /// class, except the class name of a polymorphic child relation, which is
    /// only known per document.
    pub fn build(self) -> Result<Registry> {
        let mut classes = IndexMap::new();
        for class in self.classes {
            let name = class.name().to_string();
            if classes.contains_key(&name) {
                return Err(Error::Config(ConfigError {
                    message: format!("class '{name}' is registered twice"),
                    source: None,
                }));
            }
            classes.insert(name, Rc::new(class));
        }

        for class in classes.values() {
            for metadata in class.relations() {
                let origin = format!("{}.{}", class.name(), metadata.name());
                let polymorphic_child = metadata.is_polymorphic()
                    && matches!(
                        metadata.relation(),
                        RelationMacro::ReferencedIn | RelationMacro::EmbeddedIn
                    );
                let mut names = Vec::with_capacity(2);
                if !polymorphic_child {
                    names.push(metadata.class_name());
                }
                if let Some(inverse) = metadata.inverse_class_name() {
                    names.push(inverse.to_string());
                }
                for name in names {
                    if !classes.contains_key(&name) {
                        return Err(Error::Resolution(ResolutionError {
                            class_name: name,
                            referenced_from: Some(origin),
                        }));
                    }
                }
                tracing::trace!(relation = %origin, kind = %metadata.relation(), "Relation resolved");
            }
        }

        tracing::debug!(classes = classes.len(), "Registry built");
        Ok(Registry {
            classes: Rc::new(classes),
        })
    }
}
