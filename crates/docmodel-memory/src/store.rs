//! Collections held in memory.

use std::cell::RefCell;

use docmodel_core::{Attributes, Error, ID_FIELD, Result, Selector, Store, StoreError, StoreErrorKind, Value};
use indexmap::IndexMap;

/// A [`Store`] backed by insertion-ordered vectors.
///
/// Single-threaded, like the documents that use it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RefCell<IndexMap<String, Vec<Attributes>>>,
    indexes: RefCell<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Copy of every document in a collection.
    pub fn documents(&self, collection: &str) -> Vec<Attributes> {
        self.collections
            .borrow()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored form of one document.
    pub fn get(&self, collection: &str, id: &Value) -> Option<Attributes> {
        self.collections
            .borrow()
            .get(collection)?
            .iter()
            .find(|doc| doc.get(ID_FIELD) == Some(id))
            .cloned()
    }

    /// `(collection, field)` pairs passed to `create_index`.
    pub fn indexes(&self) -> Vec<(String, String)> {
        self.indexes.borrow().clone()
    }

    pub fn clear(&self) {
        self.collections.borrow_mut().clear();
        self.indexes.borrow_mut().clear();
    }
}

fn store_error(kind: StoreErrorKind, collection: &str, message: String) -> Error {
    Error::Store(StoreError {
        kind,
        collection: collection.to_string(),
        message,
        source: None,
    })
}

fn identity(document: &Attributes, collection: &str) -> Result<Value> {
    match document.get(ID_FIELD) {
        Some(id) if !id.is_null() => Ok(id.clone()),
        _ => Err(store_error(
            StoreErrorKind::Rejected,
            collection,
            "document has no _id".to_string(),
        )),
    }
}

impl Store for MemoryStore {
    fn insert(&self, collection: &str, document: Attributes) -> Result<()> {
        let id = identity(&document, collection)?;
        let mut collections = self.collections.borrow_mut();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|doc| doc.get(ID_FIELD) == Some(&id)) {
            return Err(store_error(
                StoreErrorKind::Duplicate,
                collection,
                format!("duplicate _id {id}"),
            ));
        }
        docs.push(document);
        tracing::trace!(collection, id = %id, "Inserted");
        Ok(())
    }

    fn update(&self, collection: &str, id: &Value, document: Attributes) -> Result<()> {
        let mut collections = self.collections.borrow_mut();
        let slot = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.get(ID_FIELD) == Some(id)));
        match slot {
            Some(stored) => {
                *stored = document;
                tracing::trace!(collection, id = %id, "Updated");
                Ok(())
            }
            None => Err(store_error(
                StoreErrorKind::Missing,
                collection,
                format!("no document with _id {id}"),
            )),
        }
    }

    fn remove(&self, collection: &str, id: &Value) -> Result<bool> {
        let mut collections = self.collections.borrow_mut();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|doc| doc.get(ID_FIELD) != Some(id));
        let removed = docs.len() != before;
        tracing::trace!(collection, id = %id, removed, "Removed");
        Ok(removed)
    }

    fn find(&self, collection: &str, selector: &Selector) -> Result<Vec<Attributes>> {
        Ok(self
            .collections
            .borrow()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| selector.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_all(&self, collection: &str, selector: &Selector) -> Result<u64> {
        let mut collections = self.collections.borrow_mut();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !selector.matches(doc));
        let deleted = (before - docs.len()) as u64;
        tracing::debug!(collection, deleted, "Deleted matching documents");
        Ok(deleted)
    }

    fn create_index(&self, collection: &str, field: &str) -> Result<()> {
        let entry = (collection.to_string(), field.to_string());
        let mut indexes = self.indexes.borrow_mut();
        if !indexes.contains(&entry) {
            tracing::debug!(collection, field, "Index created");
            indexes.push(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::attrs;

    #[test]
    fn test_insert_and_find() {
        let store = MemoryStore::new();
        store.insert("people", attrs! { "_id" => 1, "name" => "a" }).unwrap();
        store.insert("people", attrs! { "_id" => 2, "name" => "b" }).unwrap();

        let found = store
            .find("people", &Selector::new().eq("name", "b"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("_id"), Some(&Value::Int(2)));
        assert_eq!(store.find("people", &Selector::new()).unwrap().len(), 2);
        assert!(store.find("posts", &Selector::new()).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_insert() {
        let store = MemoryStore::new();
        store.insert("people", attrs! { "_id" => 1 }).unwrap();
        let err = store.insert("people", attrs! { "_id" => 1 }).unwrap_err();
        match err {
            Error::Store(e) => assert_eq!(e.kind, StoreErrorKind::Duplicate),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_insert_requires_identity() {
        let store = MemoryStore::new();
        assert!(store.insert("people", attrs! { "name" => "a" }).is_err());
    }

    #[test]
    fn test_update_replaces_document() {
        let store = MemoryStore::new();
        store.insert("people", attrs! { "_id" => 1, "name" => "a" }).unwrap();
        store
            .update("people", &Value::Int(1), attrs! { "_id" => 1, "name" => "z" })
            .unwrap();
        let stored = store.get("people", &Value::Int(1)).unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("z")));

        let err = store
            .update("people", &Value::Int(9), attrs! { "_id" => 9 })
            .unwrap_err();
        assert!(matches!(err, Error::Store(ref e) if e.kind == StoreErrorKind::Missing));
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new();
        store.insert("people", attrs! { "_id" => 1 }).unwrap();
        assert!(store.remove("people", &Value::Int(1)).unwrap());
        assert!(!store.remove("people", &Value::Int(1)).unwrap());
        assert!(store.is_empty("people"));
    }

    #[test]
    fn test_delete_all_with_membership_selector() {
        let store = MemoryStore::new();
        for id in 1..=4 {
            store.insert("posts", attrs! { "_id" => id, "person_id" => 7 }).unwrap();
        }
        let selector = Selector::new().eq("person_id", 7).any_in("_id", [1, 3]);
        assert_eq!(store.delete_all("posts", &selector).unwrap(), 2);
        assert_eq!(store.len("posts"), 2);
        assert_eq!(store.count("posts", &Selector::new()).unwrap(), 2);
    }

    #[test]
    fn test_array_fields_match_by_containment() {
        let store = MemoryStore::new();
        let tags = Value::Array(vec![Value::from("rust"), Value::from("db")]);
        store.insert("posts", attrs! { "_id" => 1, "tags" => tags }).unwrap();
        let found = store
            .find("posts", &Selector::new().eq("tags", "db"))
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_create_index_is_idempotent() {
        let store = MemoryStore::new();
        store.create_index("posts", "person_id").unwrap();
        store.create_index("posts", "person_id").unwrap();
        assert_eq!(
            store.indexes(),
            vec![("posts".to_string(), "person_id".to_string())]
        );
    }
}
