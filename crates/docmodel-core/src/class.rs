//! Document class declarations.
//!
//! A [`DocumentClass`] is the runtime descriptor of a document type: its
//! collection, declared fields, relations and validators. Classes are
//! declared with [`DocumentClass::builder`] and registered in a
//! [`Registry`](crate::Registry), which validates every relation before any
//! document exists.
//!
//! ```
//! use docmodel_core::{DocumentClass, Options};
//!
//! let person = DocumentClass::builder("Person")
//!     .field("name")
//!     .references_many("posts", Options::new())
//!     .embeds_many("addresses", Options::new())
//!     .validates_presence_of("name")
//!     .build();
//! assert_eq!(person.collection(), "people");
//! assert_eq!(person.relation("posts").unwrap().inverse_class_name(), Some("Person"));
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::attributes::{Attributes, ID_FIELD};
use crate::error::ValidationError;
use crate::inflector::tableize;
use crate::relation::{Metadata, Options, RelationMacro, StoredAs};
use crate::validate::Validator;

/// Runtime descriptor of a document type.
pub struct DocumentClass {
    name: String,
    collection: String,
    fields: Vec<String>,
    relations: IndexMap<String, Rc<Metadata>>,
    validators: Vec<Validator>,
}

impl DocumentClass {
    pub fn builder(name: impl Into<String>) -> DocumentClassBuilder {
        DocumentClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection holding documents of this class when they are stored on
    /// their own.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Declared fields, the identity, and the keys relations write.
    pub fn has_field(&self, field: &str) -> bool {
        field == ID_FIELD || self.fields.iter().any(|f| f == field)
    }

    pub fn relation(&self, name: &str) -> Option<&Rc<Metadata>> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Rc<Metadata>> {
        self.relations.values()
    }

    /// Documents of an embedded class live inside a parent's record.
    pub fn is_embedded(&self) -> bool {
        self.relations
            .values()
            .any(|m| m.relation() == RelationMacro::EmbeddedIn)
    }

    /// Run every validator against `attributes`.
    pub fn validate(&self, attributes: &Attributes) -> ValidationError {
        let mut errors = ValidationError::new();
        for validator in &self.validators {
            validator.validate(attributes, &mut errors);
        }
        errors
    }
}

impl fmt::Debug for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentClass")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Builder for [`DocumentClass`].
#[derive(Debug)]
pub struct DocumentClassBuilder {
    name: String,
    collection: Option<String>,
    fields: Vec<String>,
    relations: IndexMap<String, Rc<Metadata>>,
    validators: Vec<Validator>,
}

impl DocumentClassBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fields: Vec::new(),
            relations: IndexMap::new(),
            validators: Vec::new(),
        }
    }

    /// Override the tableized collection name.
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    #[must_use]
    pub fn fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields.into_iter().fold(self, |builder, f| builder.field(f))
    }

    /// Declare a relation. `inverse_class_name` defaults to this class, and
    /// the foreign key (plus discriminator) written on this class's documents
    /// becomes a declared field.
    #[must_use]
    pub fn relation(
        mut self,
        name: impl Into<String>,
        relation: RelationMacro,
        mut options: Options,
    ) -> Self {
        if options.inverse_class_name.is_none() {
            options.inverse_class_name = Some(self.name.clone());
        }
        let metadata = Metadata::new(name, relation, options);
        if metadata.stores_foreign_key() {
            if let Ok(key) = metadata.foreign_key() {
                self = self.field(key);
            }
        }
        if relation == RelationMacro::ReferencedIn && metadata.is_polymorphic() {
            self = self.field(metadata.type_attribute());
        }
        self.relations
            .insert(metadata.name().to_string(), Rc::new(metadata));
        self
    }

    #[must_use]
    pub fn embeds_one(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::EmbedsOne, options)
    }

    #[must_use]
    pub fn embeds_many(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::EmbedsMany, options)
    }

    #[must_use]
    pub fn embedded_in(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::EmbeddedIn, options)
    }

    #[must_use]
    pub fn references_one(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::ReferencesOne, options)
    }

    /// `stored_as: Array` declares the array-of-ids variant.
    #[must_use]
    pub fn references_many(self, name: impl Into<String>, options: Options) -> Self {
        let relation = match options.stored_as {
            Some(StoredAs::Array) => RelationMacro::ReferencesManyAsArray,
            None => RelationMacro::ReferencesMany,
        };
        self.relation(name, relation, options)
    }

    #[must_use]
    pub fn referenced_in(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::ReferencedIn, options)
    }

    #[must_use]
    pub fn referenced_in_from_array(self, name: impl Into<String>, options: Options) -> Self {
        self.relation(name, RelationMacro::ReferencedInFromArray, options)
    }

    #[must_use]
    pub fn references_and_referenced_in_many(
        self,
        name: impl Into<String>,
        options: Options,
    ) -> Self {
        self.relation(name, RelationMacro::ReferencesAndReferencedInMany, options)
    }

    #[must_use]
    pub fn validates_presence_of(mut self, field: impl Into<String>) -> Self {
        self.validators.push(Validator::Presence(field.into()));
        self
    }

    #[must_use]
    pub fn validates_format_of(
        mut self,
        field: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.validators.push(Validator::Format {
            field: field.into(),
            pattern: pattern.into(),
        });
        self
    }

    #[must_use]
    pub fn validates_with(
        mut self,
        check: impl Fn(&Attributes, &mut ValidationError) + 'static,
    ) -> Self {
        self.validators.push(Validator::Custom(Rc::new(check)));
        self
    }

    pub fn build(self) -> DocumentClass {
        let collection = self.collection.unwrap_or_else(|| tableize(&self.name));
        DocumentClass {
            name: self.name,
            collection,
            fields: self.fields,
            relations: self.relations,
            validators: self.validators,
        }
    }
}
