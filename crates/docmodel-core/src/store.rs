//! Storage collaborator.
//!
//! Relations never talk to a database directly: every persistence call goes
//! through a [`Store`]. Calls are synchronous and return before the relation
//! operation that triggered them returns.

use crate::attributes::{Attributes, Selector};
use crate::error::Result;
use crate::value::Value;

/// A document store addressed by collection name.
///
/// Implementations use interior mutability; a session shares one store
/// between all of its documents.
pub trait Store {
    /// Insert a new document. The document carries its own `_id`.
    fn insert(&self, collection: &str, document: Attributes) -> Result<()>;

    /// Replace the document with the given id.
    fn update(&self, collection: &str, id: &Value, document: Attributes) -> Result<()>;

    /// Remove one document; returns whether it existed.
    fn remove(&self, collection: &str, id: &Value) -> Result<bool>;

    /// Documents matching `selector`, in insertion order.
    fn find(&self, collection: &str, selector: &Selector) -> Result<Vec<Attributes>>;

    /// Remove every matching document and return how many were removed.
    fn delete_all(&self, collection: &str, selector: &Selector) -> Result<u64>;

    /// Number of matching documents.
    fn count(&self, collection: &str, selector: &Selector) -> Result<u64> {
        Ok(self.find(collection, selector)?.len() as u64)
    }

    /// Ensure an index on `field`. Stores without indexes ignore this.
    fn create_index(&self, collection: &str, field: &str) -> Result<()> {
        tracing::trace!(collection, field, "Store has no index support");
        Ok(())
    }
}
