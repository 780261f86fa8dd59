//! Core types for docmodel.
//!
//! This crate provides the relation engine of a document model:
//!
//! - `DocumentClass` and `Registry` for declaring classes and their relations
//! - `Metadata` for deriving class names, foreign keys and inverses
//! - `Relation` proxies built lazily from stored values and kept consistent
//!   by bindings
//! - `Store` trait for the storage collaborator
//! - `Session` tying a registry, a store and `Config` together

pub mod accessors;
pub mod attributes;
pub mod class;
pub mod config;
pub mod document;
pub mod error;
pub mod inflector;
pub mod registry;
pub mod relation;
pub mod session;
pub mod store;
pub mod validate;
pub mod value;

pub use accessors::Assign;
pub use attributes::{Attributes, Condition, ID_FIELD, Selector};
pub use class::{DocumentClass, DocumentClassBuilder};
pub use config::Config;
pub use document::{DocumentRef, RelationSlot, WeakDocumentRef};
pub use error::{
    ConfigError, Error, FieldValidationError, NotFoundError, RelationError, RelationErrorKind,
    ResolutionError, Result, StoreError, StoreErrorKind, TypeError, ValidationError,
    ValidationErrorKind,
};
pub use registry::{IndexSpec, Registry, RegistryBuilder};
pub use relation::{
    Binding, Builder, Capabilities, DESTROY_FIELD, Dependent, ManyRelation, Metadata,
    NestedBuilder, NestedOptions, OneRelation, Options, Proxy, Relation, RelationMacro, StoredAs,
    Target,
};
pub use session::{Find, Found, Klass, Session};
pub use store::Store;
pub use validate::Validator;
pub use value::Value;
