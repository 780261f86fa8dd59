//! Relation metadata.
//!
//! A [`Metadata`] describes one declared relation of one document class. It
//! holds the relation name, its [`RelationMacro`] and the explicitly supplied
//! [`Options`]; everything else (class names, foreign keys, the attribute key
//! used during lazy build, inverse names) is derived on demand and never
//! cached.
//!
//! ```
//! use docmodel_core::{Metadata, Options, RelationMacro};
//!
//! let posts = Metadata::new(
//!     "posts",
//!     RelationMacro::ReferencesMany,
//!     Options::new().inverse_class_name("Person"),
//! );
//! assert_eq!(posts.class_name(), "Post");
//! assert_eq!(posts.foreign_key().unwrap(), "person_id");
//! assert_eq!(posts.key().unwrap(), "_id");
//! ```

use std::rc::Rc;

use crate::class::DocumentClass;
use crate::error::{Error, RelationErrorKind, Result};
use crate::inflector::{classify, singularize, underscore};
use crate::registry::Registry;
use crate::relation::kind::{Capabilities, RelationMacro};

/// Cascade applied to related documents when the owner is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    /// Delete related documents without running their own cascades
    Delete,
    /// Destroy related documents, cascading further
    Destroy,
    /// Clear the foreign key on related documents and save them
    Nullify,
}

/// Alternative storage for a `references_many` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredAs {
    /// Ids are stored as an array on the owner
    Array,
}

/// Explicitly supplied relation options. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub class_name: Option<String>,
    pub inverse_class_name: Option<String>,
    pub foreign_key: Option<String>,
    pub polymorphic: Option<bool>,
    /// Polymorphic role name used from the child side
    pub as_role: Option<String>,
    pub dependent: Option<Dependent>,
    pub index: Option<bool>,
    pub stored_as: Option<StoredAs>,
    /// Name of an extension module attached to the proxy
    pub extension: Option<String>,
    pub inverse_of: Option<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn inverse_class_name(mut self, name: impl Into<String>) -> Self {
        self.inverse_class_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn polymorphic(mut self, polymorphic: bool) -> Self {
        self.polymorphic = Some(polymorphic);
        self
    }

    #[must_use]
    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.as_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn dependent(mut self, dependent: Dependent) -> Self {
        self.dependent = Some(dependent);
        self
    }

    #[must_use]
    pub fn index(mut self, index: bool) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn stored_as(mut self, stored_as: StoredAs) -> Self {
        self.stored_as = Some(stored_as);
        self
    }

    #[must_use]
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    #[must_use]
    pub fn inverse_of(mut self, name: impl Into<String>) -> Self {
        self.inverse_of = Some(name.into());
        self
    }
}

/// Descriptor of one declared relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    name: String,
    relation: RelationMacro,
    options: Options,
}

impl Metadata {
    pub fn new(name: impl Into<String>, relation: RelationMacro, options: Options) -> Self {
        Self {
            name: name.into(),
            relation,
            options,
        }
    }

    // ========================================================================
    // Declared properties
    // ========================================================================

    /// The accessor name, e.g. `posts`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The relation macro.
    pub fn relation(&self) -> RelationMacro {
        self.relation
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        self.relation.capabilities()
    }

    pub fn inverse_class_name(&self) -> Option<&str> {
        self.options.inverse_class_name.as_deref()
    }

    pub fn as_role(&self) -> Option<&str> {
        self.options.as_role.as_deref()
    }

    pub fn dependent(&self) -> Option<Dependent> {
        self.options.dependent
    }

    pub fn stored_as(&self) -> Option<StoredAs> {
        self.options.stored_as
    }

    pub fn extension(&self) -> Option<&str> {
        self.options.extension.as_deref()
    }

    pub fn inverse_of(&self) -> Option<&str> {
        self.options.inverse_of.as_deref()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.options.polymorphic == Some(true)
    }

    /// True only when `index: true` was supplied.
    pub fn is_indexed(&self) -> bool {
        self.options.index == Some(true)
    }

    pub fn is_embedded(&self) -> bool {
        self.relation.is_embedded()
    }

    pub fn is_many(&self) -> bool {
        self.relation.is_many()
    }

    pub fn stores_foreign_key(&self) -> bool {
        self.relation.stores_foreign_key()
    }

    // Presence predicates: was the option supplied at all, whatever its value.

    pub fn has_name(&self) -> bool {
        true
    }

    pub fn has_relation(&self) -> bool {
        true
    }

    pub fn has_class_name(&self) -> bool {
        self.options.class_name.is_some()
    }

    pub fn has_inverse_class_name(&self) -> bool {
        self.options.inverse_class_name.is_some()
    }

    pub fn has_foreign_key(&self) -> bool {
        self.options.foreign_key.is_some()
    }

    pub fn has_polymorphic(&self) -> bool {
        self.options.polymorphic.is_some()
    }

    pub fn has_as(&self) -> bool {
        self.options.as_role.is_some()
    }

    pub fn has_dependent(&self) -> bool {
        self.options.dependent.is_some()
    }

    pub fn has_index(&self) -> bool {
        self.options.index.is_some()
    }

    pub fn has_stored_as(&self) -> bool {
        self.options.stored_as.is_some()
    }

    pub fn has_extension(&self) -> bool {
        self.options.extension.is_some()
    }

    pub fn has_inverse_of(&self) -> bool {
        self.options.inverse_of.is_some()
    }

    // ========================================================================
    // Derived names
    // ========================================================================

    /// Name of the related class: the explicit option, else the classified
    /// relation name (singularized first for plural macros).
    pub fn class_name(&self) -> String {
        if let Some(name) = &self.options.class_name {
            return name.clone();
        }
        if self.is_many() {
            classify(&singularize(&self.name))
        } else {
            classify(&self.name)
        }
    }

    /// Foreign key field.
    ///
    /// An explicit option always wins. Macros that store the key on the
    /// declaring class derive it from the singular relation name; the others
    /// derive it from the polymorphic role or the inverse class name.
    pub fn foreign_key(&self) -> Result<String> {
        if let Some(key) = &self.options.foreign_key {
            return Ok(key.clone());
        }
        let Some(suffix) = self.relation.foreign_key_suffix() else {
            return Err(self.error(
                RelationErrorKind::NoForeignKey,
                format!("{} relations have no foreign key", self.relation),
            ));
        };
        if self.stores_foreign_key() {
            return Ok(format!("{}{}", underscore(&singularize(&self.name)), suffix));
        }
        if let Some(role) = self.as_role() {
            return Ok(format!("{role}{suffix}"));
        }
        let inverse = self.required_inverse_class_name()?;
        Ok(format!("{}{}", underscore(inverse), suffix))
    }

    pub fn foreign_key_setter(&self) -> Result<String> {
        Ok(format!("{}=", self.foreign_key()?))
    }

    /// Attribute consulted when the relation is lazily built.
    pub fn key(&self) -> Result<String> {
        if self.is_embedded() {
            Ok(self.name.clone())
        } else if self.stores_foreign_key() {
            self.foreign_key()
        } else {
            Ok(crate::attributes::ID_FIELD.to_string())
        }
    }

    /// Discriminator attribute of a polymorphic relation: `<as>_type` on the
    /// owning side, `<name>_type` on the child side.
    pub fn type_attribute(&self) -> String {
        match self.as_role() {
            Some(role) => format!("{role}_type"),
            None => format!("{}_type", self.name),
        }
    }

    /// Name of the relation on the other side.
    ///
    /// `as` wins, then an explicit `inverse_of`. A polymorphic child needs the
    /// owning class to find the relation declared with a matching `as`; with
    /// zero or several matches the inverse is unknown.
    pub fn inverse(&self, instance: Option<&DocumentClass>) -> Option<String> {
        if let Some(role) = self.as_role() {
            return Some(role.to_string());
        }
        if let Some(name) = self.inverse_of() {
            return Some(name.to_string());
        }
        if self.is_polymorphic() {
            return instance
                .and_then(|class| self.inverse_metadata(class))
                .map(|m| m.name().to_string());
        }
        self.inverse_class_name().map(underscore)
    }

    pub fn inverse_setter(&self, instance: Option<&DocumentClass>) -> Option<String> {
        self.inverse(instance).map(|name| format!("{name}="))
    }

    /// The relation declared on `other` that points back at this one.
    pub fn inverse_metadata(&self, other: &DocumentClass) -> Option<Rc<Metadata>> {
        if let Some(name) = self.inverse_of() {
            return other.relation(name).cloned();
        }
        if let Some(role) = self.as_role() {
            return other.relation(role).cloned();
        }
        let inverse_macros = self.relation.inverse_macros();
        let candidates: Vec<&Rc<Metadata>> = if self.is_polymorphic() {
            other
                .relations()
                .filter(|m| inverse_macros.contains(&m.relation()))
                .filter(|m| m.as_role() == Some(self.name.as_str()))
                .collect()
        } else {
            let owner = self.inverse_class_name()?;
            other
                .relations()
                .filter(|m| inverse_macros.contains(&m.relation()))
                .filter(|m| m.as_role().is_none() && !m.is_polymorphic())
                .filter(|m| m.class_name() == owner)
                .collect()
        };
        match candidates.as_slice() {
            [only] => Some(Rc::clone(only)),
            [] => None,
            several => {
                tracing::warn!(
                    relation = %self.name,
                    class = other.name(),
                    candidates = several.len(),
                    "Ambiguous inverse relation, leaving it unresolved"
                );
                None
            }
        }
    }

    // ========================================================================
    // Class resolution
    // ========================================================================

    /// The related class.
    pub fn klass(&self, registry: &Registry) -> Result<Rc<DocumentClass>> {
        registry.resolve(&self.class_name())
    }

    /// The declaring class.
    pub fn inverse_klass(&self, registry: &Registry) -> Result<Rc<DocumentClass>> {
        registry.resolve(self.required_inverse_class_name()?)
    }

    fn required_inverse_class_name(&self) -> Result<&str> {
        self.inverse_class_name().ok_or_else(|| {
            self.error(
                RelationErrorKind::MissingOption,
                "inverse_class_name is required to derive this value",
            )
        })
    }

    pub(crate) fn error(&self, kind: RelationErrorKind, message: impl Into<String>) -> Error {
        Error::relation(kind, self.name.clone(), message)
    }
}
