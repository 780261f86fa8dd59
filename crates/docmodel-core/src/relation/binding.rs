//! Bindings keep both sides of a relation consistent in memory.
//!
//! Binding writes keys and sets the inverse relation without triggering a
//! lazy load and without cascading back into the relation that started it.
//! Unbinding only clears links that still point at the base, so unbinding a
//! document that was already moved elsewhere leaves its new owner alone.

use std::rc::Rc;

use crate::document::DocumentRef;
use crate::error::{RelationErrorKind, Result};
use crate::relation::{Metadata, OneRelation, Relation, RelationMacro};
use crate::value::Value;

/// Maintains the inverse side of one relation kind.
pub trait Binding {
    /// Link `doc` to `base` through `metadata`, a relation declared on
    /// `base`'s class.
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>)
    -> Result<()>;

    /// Undo [`bind_one`](Binding::bind_one) where it still applies.
    fn unbind_one(
        &self,
        base: &DocumentRef,
        doc: &DocumentRef,
        metadata: &Rc<Metadata>,
    ) -> Result<()>;

    fn bind(&self, base: &DocumentRef, docs: &[DocumentRef], metadata: &Rc<Metadata>) -> Result<()> {
        for doc in docs {
            self.bind_one(base, doc, metadata)?;
        }
        Ok(())
    }

    fn unbind(
        &self,
        base: &DocumentRef,
        docs: &[DocumentRef],
        metadata: &Rc<Metadata>,
    ) -> Result<()> {
        for doc in docs {
            self.unbind_one(base, doc, metadata)?;
        }
        Ok(())
    }
}

/// Foreign key lives on the target (`references_many`, `references_one`).
struct Referenced;

/// Target ids live in an array on the base.
struct IdArray;

/// Foreign key lives on the base (`referenced_in`).
struct ReferencedIn;

/// Target is stored inside the base (`embeds_many`, `embeds_one`).
struct Embedded;

/// Base is stored inside the target (`embedded_in`).
struct EmbeddedIn;

/// The binding for a relation's macro.
pub fn binding_for(metadata: &Metadata) -> Result<&'static dyn Binding> {
    match metadata.relation() {
        RelationMacro::ReferencesOne | RelationMacro::ReferencesMany => Ok(&Referenced),
        RelationMacro::ReferencesManyAsArray => Ok(&IdArray),
        RelationMacro::ReferencedIn => Ok(&ReferencedIn),
        RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => Ok(&Embedded),
        RelationMacro::EmbeddedIn => Ok(&EmbeddedIn),
        other @ (RelationMacro::ReferencedInFromArray
        | RelationMacro::ReferencesAndReferencedInMany) => Err(metadata.error(
            RelationErrorKind::Unsupported,
            format!("{other} relations cannot be bound"),
        )),
    }
}

/// Point `doc`'s singular inverse relation back at `base`.
fn set_inverse(base: &DocumentRef, doc: &DocumentRef, metadata: &Metadata) {
    let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
        return;
    };
    if inverse.is_many() || !inverse.relation().is_supported() {
        return;
    }
    tracing::trace!(relation = metadata.name(), inverse = inverse.name(), "Setting inverse");
    let name = inverse.name().to_string();
    doc.put_slot(&name, Some(Relation::One(OneRelation::back_link(doc, base, inverse))));
}

fn clear_inverse(base: &DocumentRef, doc: &DocumentRef, metadata: &Metadata) {
    let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
        return;
    };
    if let Some(Relation::One(one)) = doc.loaded_relation(inverse.name()) {
        if one.points_at(base) {
            doc.put_slot(inverse.name(), None);
        }
    }
}

impl Binding for Referenced {
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        doc.write_attribute(&metadata.foreign_key()?, base.id());
        if metadata.as_role().is_some() {
            doc.write_attribute(&metadata.type_attribute(), Value::Text(base.class_name()));
        }
        set_inverse(base, doc, metadata);
        Ok(())
    }

    fn unbind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        let key = metadata.foreign_key()?;
        if doc.get(&key) == Some(base.id()) {
            doc.write_attribute(&key, Value::Null);
            if metadata.as_role().is_some() {
                doc.write_attribute(&metadata.type_attribute(), Value::Null);
            }
        }
        clear_inverse(base, doc, metadata);
        Ok(())
    }
}

impl Binding for IdArray {
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        let key = metadata.foreign_key()?;
        let id = doc.id();
        let mut ids = stored_ids(base, &key);
        if !ids.contains(&id) {
            ids.push(id);
            base.write_attribute(&key, Value::Array(ids));
        }
        set_inverse(base, doc, metadata);
        Ok(())
    }

    fn unbind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        let key = metadata.foreign_key()?;
        let id = doc.id();
        let mut ids = stored_ids(base, &key);
        let before = ids.len();
        ids.retain(|stored| *stored != id);
        if ids.len() != before {
            base.write_attribute(&key, Value::Array(ids));
        }
        clear_inverse(base, doc, metadata);
        Ok(())
    }
}

pub(crate) fn stored_ids(base: &DocumentRef, key: &str) -> Vec<Value> {
    base.get(key)
        .and_then(|value| value.as_array().map(<[Value]>::to_vec))
        .unwrap_or_default()
}

impl Binding for ReferencedIn {
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        base.write_attribute(&metadata.foreign_key()?, doc.id());
        if metadata.is_polymorphic() {
            base.write_attribute(&metadata.type_attribute(), Value::Text(doc.class_name()));
        }
        let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
            return Ok(());
        };
        // Only an already loaded inverse is updated; loading it here would
        // query the store from inside a binding.
        match doc.loaded_relation(inverse.name()) {
            Some(Relation::Many(many)) => many.push_loaded(base),
            Some(Relation::One(_)) => {
                let name = inverse.name().to_string();
                doc.put_slot(&name, Some(Relation::One(OneRelation::new(doc, base.clone(), inverse))));
            }
            None => {}
        }
        Ok(())
    }

    fn unbind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        let key = metadata.foreign_key()?;
        if base.get(&key) == Some(doc.id()) {
            base.write_attribute(&key, Value::Null);
            if metadata.is_polymorphic() {
                base.write_attribute(&metadata.type_attribute(), Value::Null);
            }
        }
        let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
            return Ok(());
        };
        match doc.loaded_relation(inverse.name()) {
            Some(Relation::Many(many)) => {
                many.remove_loaded(base);
            }
            Some(Relation::One(one)) if one.points_at(base) => doc.put_slot(inverse.name(), None),
            _ => {}
        }
        Ok(())
    }
}

impl Binding for Embedded {
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        doc.set_embedding(base, Rc::clone(metadata));
        set_inverse(base, doc, metadata);
        Ok(())
    }

    fn unbind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        doc.clear_embedding_if(base);
        clear_inverse(base, doc, metadata);
        Ok(())
    }
}

impl Binding for EmbeddedIn {
    fn bind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
            return Ok(());
        };
        base.set_embedding(doc, Rc::clone(&inverse));
        if inverse.is_many() {
            // The parent's raw children are materialized before the new one
            // joins them.
            if let Some(Relation::Many(many)) = doc.relation(inverse.name())? {
                many.push_loaded(base);
            }
        } else {
            let name = inverse.name().to_string();
            doc.put_slot(&name, Some(Relation::One(OneRelation::new(doc, base.clone(), inverse))));
        }
        Ok(())
    }

    fn unbind_one(&self, base: &DocumentRef, doc: &DocumentRef, metadata: &Rc<Metadata>) -> Result<()> {
        base.clear_embedding_if(doc);
        let Some(inverse) = metadata.inverse_metadata(&doc.class()) else {
            return Ok(());
        };
        match doc.loaded_relation(inverse.name()) {
            Some(Relation::Many(many)) => {
                many.remove_loaded(base);
            }
            Some(Relation::One(one)) if one.points_at(base) => doc.put_slot(inverse.name(), None),
            _ => {}
        }
        Ok(())
    }
}
