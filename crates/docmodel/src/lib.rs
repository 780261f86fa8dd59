//! docmodel - document relations in Rust.
//!
//! Declare document classes and their relations, then let lazy proxies load
//! related documents and bindings keep both sides consistent:
//!
//! - `embeds_many` / `embeds_one` / `embedded_in` for documents stored
//!   inside their parent's record
//! - `references_many` / `references_one` / `referenced_in` for documents in
//!   their own collections, linked by foreign keys
//! - polymorphic relations through `as` and `polymorphic`
//! - `dependent` cascades, nested attributes and typed accessors
//!
//! # Quick Start
//!
//! ```rust
//! use docmodel::prelude::*;
//!
//! let session = SessionBuilder::new()
//!     .class(
//!         DocumentClass::builder("Person")
//!             .field("name")
//!             .references_many("posts", Options::new().dependent(Dependent::Destroy)),
//!     )
//!     .class(
//!         DocumentClass::builder("Post")
//!             .field("title")
//!             .referenced_in("person", Options::new()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let person = session.klass("Person").unwrap().create(attrs! { "name" => "Ada" }).unwrap();
//! let post = person.many("posts").unwrap().create(attrs! { "title" => "Notes" }).unwrap();
//!
//! assert_eq!(post.get("person_id"), Some(person.id()));
//! assert!(post.one("person").unwrap().unwrap().ptr_eq(&person));
//!
//! person.destroy().unwrap();
//! assert_eq!(session.klass("Post").unwrap().count(&Selector::new()).unwrap(), 0);
//! ```

pub use docmodel_core::{
    Assign, Attributes, Binding, Builder, Capabilities, Condition, Config, DESTROY_FIELD,
    Dependent, DocumentClass, DocumentClassBuilder, DocumentRef, Error, Find, Found, ID_FIELD,
    IndexSpec, Klass, ManyRelation, Metadata, NestedBuilder, NestedOptions, OneRelation, Options,
    Proxy, Registry, RegistryBuilder, Relation, RelationErrorKind, RelationMacro, RelationSlot,
    Result, Selector, Session, Store, StoredAs, Target, ValidationError, Value, WeakDocumentRef,
    attrs,
};

pub use docmodel_memory::MemoryStore;

pub mod session;
pub use session::SessionBuilder;

/// Typed relation accessors for [`DocumentRef`].
///
/// Generates a trait with a getter and a setter per relation and implements
/// it for `DocumentRef`. The getter's name is the relation's name. `many`
/// getters return the proxy; `one` getters return the target, with `None`
/// when the relation is empty.
///
/// ```rust
/// use docmodel::prelude::*;
///
/// relation_accessors! {
///     pub trait PostRelations {
///         one person, set_person;
///         many comments, set_comments;
///     }
/// }
///
/// let session = SessionBuilder::new()
///     .class(DocumentClass::builder("Person"))
///     .class(
///         DocumentClass::builder("Post")
///             .referenced_in("person", Options::new())
///             .embeds_many("comments", Options::new()),
///     )
///     .class(DocumentClass::builder("Comment").embedded_in("post", Options::new()))
///     .build()
///     .unwrap();
///
/// let post = session.new_document("Post", attrs! {}).unwrap();
/// assert!(post.person().unwrap().is_none());
///
/// let person = session.new_document("Person", attrs! {}).unwrap();
/// post.set_person(&person).unwrap();
/// assert_eq!(post.person().unwrap(), Some(person));
/// assert!(post.comments().unwrap().is_empty());
/// ```
#[macro_export]
macro_rules! relation_accessors {
    (@decl many $getter:ident $setter:ident) => {
        fn $getter(&self) -> $crate::Result<$crate::ManyRelation>;
        fn $setter(&self, value: impl Into<$crate::Assign>) -> $crate::Result<()>;
    };
    (@decl one $getter:ident $setter:ident) => {
        fn $getter(&self) -> $crate::Result<Option<$crate::DocumentRef>>;
        fn $setter(&self, value: impl Into<$crate::Assign>) -> $crate::Result<()>;
    };
    (@impl many $getter:ident $setter:ident) => {
        fn $getter(&self) -> $crate::Result<$crate::ManyRelation> {
            self.many(stringify!($getter))
        }
        fn $setter(&self, value: impl Into<$crate::Assign>) -> $crate::Result<()> {
            self.set_relation(stringify!($getter), value).map(drop)
        }
    };
    (@impl one $getter:ident $setter:ident) => {
        fn $getter(&self) -> $crate::Result<Option<$crate::DocumentRef>> {
            self.one(stringify!($getter))
        }
        fn $setter(&self, value: impl Into<$crate::Assign>) -> $crate::Result<()> {
            self.set_relation(stringify!($getter), value).map(drop)
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $($kind:ident $getter:ident, $setter:ident;)*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name {
            $($crate::relation_accessors!(@decl $kind $getter $setter);)*
        }

        impl $name for $crate::DocumentRef {
            $($crate::relation_accessors!(@impl $kind $getter $setter);)*
        }
    };
}

// ============================================================================
// Prelude
// ============================================================================

/// Everything needed to declare classes and work with relations.
pub mod prelude {
    pub use crate::{
        // Declarations
        Assign,
        Attributes,
        Config,
        Dependent,
        DocumentClass,
        DocumentRef,
        Error,
        Find,
        Found,
        Klass,
        ManyRelation,
        // Storage
        MemoryStore,
        NestedOptions,
        OneRelation,
        Options,
        Proxy,
        Registry,
        Relation,
        Result,
        Selector,
        Session,
        SessionBuilder,
        Store,
        StoredAs,
        Value,
        // Macros
        attrs,
        relation_accessors,
    };
}
