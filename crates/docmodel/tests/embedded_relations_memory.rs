use std::rc::Rc;

use docmodel::prelude::*;
use docmodel::RelationErrorKind;

fn setup() -> (Session, Rc<MemoryStore>) {
    let store = Rc::new(MemoryStore::new());
    let session = SessionBuilder::new()
        .class(
            DocumentClass::builder("Person")
                .field("name")
                .embeds_many("addresses", Options::new())
                .embeds_one("passport", Options::new()),
        )
        .class(
            DocumentClass::builder("Address")
                .field("street")
                .embedded_in("person", Options::new()),
        )
        .class(
            DocumentClass::builder("Passport")
                .field("number")
                .embedded_in("person", Options::new()),
        )
        .store(store.clone())
        .build()
        .expect("build session");
    (session, store)
}

fn create_person(session: &Session) -> DocumentRef {
    session
        .klass("Person")
        .and_then(|klass| klass.create(attrs! { "name" => "p" }))
        .expect("create person")
}

fn reload(session: &Session, person: &DocumentRef) -> DocumentRef {
    session
        .klass("Person")
        .unwrap()
        .find_by_id(&person.id())
        .unwrap()
        .expect("stored person")
}

fn stored_addresses(store: &MemoryStore, person: &DocumentRef) -> Vec<Value> {
    store
        .get("people", &person.id())
        .and_then(|stored| stored.get("addresses").and_then(Value::as_array).map(<[Value]>::to_vec))
        .unwrap_or_default()
}

#[test]
fn built_children_know_their_parent_and_position() {
    let (session, store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let addresses = person.many("addresses").unwrap();

    let first = addresses.build(attrs! { "street" => "Main" }).unwrap();
    let second = addresses.build(attrs! { "street" => "Side" }).unwrap();

    assert!(first.embedded_parent().unwrap().ptr_eq(&person));
    assert!(first.one("person").unwrap().unwrap().ptr_eq(&person));
    assert_eq!(first.embedded_index(), Some(0));
    assert_eq!(second.embedded_index(), Some(1));
    assert_eq!(store.len("people"), 0);
}

#[test]
fn saving_the_root_stores_embedded_children() {
    let (session, store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let addresses = person.many("addresses").unwrap();
    let address = addresses.build(attrs! { "street" => "Main" }).unwrap();
    addresses.build(attrs! { "street" => "Side" }).unwrap();

    assert!(person.save().unwrap());

    assert!(address.is_persisted());
    assert_eq!(stored_addresses(&store, &person).len(), 2);
    assert_eq!(store.len("addresses"), 0);
}

#[test]
fn embedded_child_cannot_be_saved_before_its_root() {
    let (session, _store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let address = person
        .many("addresses")
        .unwrap()
        .build(attrs! { "street" => "Main" })
        .unwrap();

    let err = address.save().unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::ParentNotPersisted));
}

#[test]
fn creating_on_a_persisted_parent_rewrites_the_root() {
    let (session, store) = setup();
    let person = create_person(&session);
    let address = person
        .many("addresses")
        .unwrap()
        .create(attrs! { "street" => "A" })
        .unwrap();

    assert!(address.is_persisted());
    assert_eq!(stored_addresses(&store, &person).len(), 1);

    address.set("street", "B").unwrap();
    assert!(address.save().unwrap());
    let stored = stored_addresses(&store, &person);
    let street = stored[0].as_map().and_then(|m| m.get("street")).cloned();
    assert_eq!(street, Some(Value::from("B")));
}

#[test]
fn stored_children_are_materialized_lazily() {
    let (session, _store) = setup();
    let person = create_person(&session);
    let addresses = person.many("addresses").unwrap();
    addresses.create(attrs! { "street" => "A" }).unwrap();
    addresses.create(attrs! { "street" => "B" }).unwrap();

    let loaded = reload(&session, &person);
    assert!(loaded.has_pending("addresses"));
    assert!(loaded.get("addresses").is_none());

    let children = loaded.many("addresses").unwrap();
    assert!(!loaded.has_pending("addresses"));
    assert_eq!(children.len(), 2);

    let second = children.get(1).unwrap();
    assert!(second.is_persisted());
    assert!(second.embedded_parent().unwrap().ptr_eq(&loaded));
    assert_eq!(second.embedded_index(), Some(1));
    assert_eq!(second.get("street"), Some(Value::from("B")));
}

#[test]
fn untouched_raw_children_survive_a_save() {
    let (session, store) = setup();
    let person = create_person(&session);
    person.many("addresses").unwrap().create(attrs! { "street" => "A" }).unwrap();

    let loaded = reload(&session, &person);
    loaded.set("name", "renamed").unwrap();
    assert!(loaded.save().unwrap());

    assert!(loaded.has_pending("addresses"));
    assert_eq!(stored_addresses(&store, &person).len(), 1);
}

#[test]
fn assigning_nil_on_a_persisted_parent_removes_children() {
    let (session, store) = setup();
    let person = create_person(&session);
    let addresses = person.many("addresses").unwrap();
    let address = addresses.create(attrs! { "street" => "A" }).unwrap();
    addresses.create(attrs! { "street" => "B" }).unwrap();

    person.set_relation("addresses", Assign::Nil).unwrap();

    assert!(address.is_destroyed());
    assert!(address.embedded_parent().is_none());
    assert!(person.many("addresses").unwrap().is_empty());
    assert!(stored_addresses(&store, &person).is_empty());
}

#[test]
fn deleting_a_child_reindexes_its_siblings() {
    let (session, store) = setup();
    let person = create_person(&session);
    let addresses = person.many("addresses").unwrap();
    let first = addresses.create(attrs! { "street" => "A" }).unwrap();
    let second = addresses.create(attrs! { "street" => "B" }).unwrap();

    first.delete().unwrap();

    assert!(first.is_destroyed());
    assert_eq!(addresses.len(), 1);
    assert_eq!(second.embedded_index(), Some(0));
    assert_eq!(stored_addresses(&store, &person).len(), 1);
}

#[test]
fn find_searches_embedded_children_in_memory() {
    let (session, _store) = setup();
    let person = create_person(&session);
    let addresses = person.many("addresses").unwrap();
    let a = addresses.create(attrs! { "street" => "A" }).unwrap();
    addresses.create(attrs! { "street" => "B" }).unwrap();

    let found = addresses
        .find(Find::First, Some(Selector::new().eq("street", "B")))
        .unwrap()
        .into_one()
        .unwrap();
    assert_eq!(found.get("street"), Some(Value::from("B")));
    assert_eq!(addresses.find(Find::Id(a.id()), None).unwrap().into_one(), Some(a));
    assert_eq!(addresses.count().unwrap(), 2);

    let err = addresses
        .find(Find::Id(Value::from("missing")), None)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn embeds_one_round_trips_through_the_root() {
    let (session, store) = setup();
    let person = create_person(&session);
    let passport = person.create_one("passport", attrs! { "number" => "X1" }).unwrap();

    assert!(passport.is_persisted());
    assert!(passport.one("person").unwrap().unwrap().ptr_eq(&person));
    let stored = store.get("people", &person.id()).unwrap();
    let number = stored
        .get("passport")
        .and_then(Value::as_map)
        .and_then(|m| m.get("number"))
        .cloned();
    assert_eq!(number, Some(Value::from("X1")));

    let loaded = reload(&session, &person);
    let loaded_passport = loaded.one("passport").unwrap().unwrap();
    assert_eq!(loaded_passport.get("number"), Some(Value::from("X1")));
    assert!(loaded_passport.embedded_parent().unwrap().ptr_eq(&loaded));
}

#[test]
fn replacing_an_embedded_one_destroys_the_previous_target() {
    let (session, store) = setup();
    let person = create_person(&session);
    let old = person.create_one("passport", attrs! { "number" => "X1" }).unwrap();
    let new = session.new_document("Passport", attrs! { "number" => "X2" }).unwrap();

    person.set_relation("passport", &new).unwrap();

    assert!(old.is_destroyed());
    assert!(new.is_persisted());
    let stored = store.get("people", &person.id()).unwrap();
    let number = stored
        .get("passport")
        .and_then(Value::as_map)
        .and_then(|m| m.get("number"))
        .cloned();
    assert_eq!(number, Some(Value::from("X2")));
}

#[test]
fn assigning_the_parent_from_the_child_side_embeds_it() {
    let (session, _store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let address = session.new_document("Address", attrs! { "street" => "A" }).unwrap();

    address.set_relation("person", &person).unwrap();

    assert!(person.many("addresses").unwrap().contains(&address));
    assert!(address.embedded_parent().unwrap().ptr_eq(&person));
    assert_eq!(address.embedded_index(), Some(0));
    assert!(address.one("person").unwrap().unwrap().ptr_eq(&person));
}

#[test]
fn raw_children_in_new_documents_are_pending() {
    let (session, _store) = setup();
    let raw = Value::Array(vec![attrs! { "street" => "A" }.into_value()]);
    let person = session
        .new_document("Person", attrs! { "name" => "p", "addresses" => raw })
        .unwrap();

    assert!(person.has_pending("addresses"));
    let addresses = person.many("addresses").unwrap();
    assert_eq!(addresses.len(), 1);
    assert!(addresses.first().unwrap().is_new_record());
}

#[test]
fn nested_attributes_update_build_and_remove() {
    let (session, store) = setup();
    let person = create_person(&session);
    let addresses = person.many("addresses").unwrap();
    let kept = addresses.create(attrs! { "street" => "A" }).unwrap();
    let removed = addresses.create(attrs! { "street" => "B" }).unwrap();

    let class = person.class();
    let metadata = class.relation("addresses").unwrap();
    metadata
        .nested_builder(
            vec![
                attrs! { "_id" => kept.id(), "street" => "A2" },
                attrs! { "_id" => removed.id(), "_destroy" => true },
                attrs! { "street" => "C" },
            ],
            NestedOptions::new().allow_destroy(true),
        )
        .build(&person)
        .unwrap();

    assert_eq!(kept.get("street"), Some(Value::from("A2")));
    assert!(removed.is_destroyed());
    assert_eq!(addresses.len(), 2);
    assert!(addresses.last().unwrap().is_new_record());

    assert!(person.save().unwrap());
    let streets: Vec<Value> = stored_addresses(&store, &person)
        .iter()
        .filter_map(|doc| doc.as_map().and_then(|m| m.get("street")).cloned())
        .collect();
    assert_eq!(streets, vec![Value::from("A2"), Value::from("C")]);
}

#[test]
fn nested_attributes_respect_destroy_and_limit_options() {
    let (session, _store) = setup();
    let person = create_person(&session);
    let address = person
        .many("addresses")
        .unwrap()
        .create(attrs! { "street" => "A" })
        .unwrap();
    let class = person.class();
    let metadata = class.relation("addresses").unwrap();

    metadata
        .nested_builder(
            vec![attrs! { "_id" => address.id(), "_destroy" => true }],
            NestedOptions::new(),
        )
        .build(&person)
        .unwrap();
    assert!(!address.is_destroyed());
    assert_eq!(person.many("addresses").unwrap().len(), 1);

    let err = metadata
        .nested_builder(
            vec![attrs! { "street" => "B" }, attrs! { "street" => "C" }],
            NestedOptions::new().limit(1),
        )
        .build(&person)
        .unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::TooManyRecords));
    assert_eq!(person.many("addresses").unwrap().len(), 1);
}
