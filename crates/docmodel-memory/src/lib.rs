//! In-memory document store for docmodel.
//!
//! This crate provides [`MemoryStore`], a [`Store`](docmodel_core::Store)
//! that keeps every collection in process memory. It is the store used by
//! the test suites and works well for prototypes.
//!
//! # Features
//!
//! - Insertion-ordered collections
//! - Equality and membership selectors, matching arrays by containment
//! - Duplicate and missing-document detection
//! - Index declarations recorded for inspection
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use docmodel_core::{Config, DocumentClass, Registry, Session, attrs};
//! use docmodel_memory::MemoryStore;
//!
//! let registry = Registry::builder()
//!     .register(DocumentClass::builder("Person").field("name").build())
//!     .build()
//!     .unwrap();
//! let store = Rc::new(MemoryStore::new());
//! let session = Session::new(registry, store.clone(), Config::default()).unwrap();
//!
//! let person = session.klass("Person").unwrap().create(attrs! { "name" => "Ada" }).unwrap();
//! assert!(person.is_persisted());
//! assert_eq!(store.len("people"), 1);
//! ```

pub mod store;

pub use store::MemoryStore;
