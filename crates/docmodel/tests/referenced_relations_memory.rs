use std::rc::Rc;

use docmodel::prelude::*;
use docmodel::{Metadata, RelationErrorKind};

fn setup() -> (Session, Rc<MemoryStore>) {
    let store = Rc::new(MemoryStore::new());
    let session = SessionBuilder::new()
        .class(
            DocumentClass::builder("Person")
                .field("name")
                .references_many("posts", Options::new().dependent(Dependent::Destroy))
                .references_one("game", Options::new().dependent(Dependent::Nullify))
                .references_many("preferences", Options::new().stored_as(StoredAs::Array))
                .references_many("addresses", Options::new().as_role("addressable")),
        )
        .class(
            DocumentClass::builder("Post")
                .field("title")
                .referenced_in("person", Options::new()),
        )
        .class(
            DocumentClass::builder("Game")
                .field("score")
                .referenced_in("person", Options::new()),
        )
        .class(DocumentClass::builder("Preference").field("name"))
        .class(
            DocumentClass::builder("Address")
                .field("street")
                .referenced_in("addressable", Options::new().polymorphic(true)),
        )
        .class(
            DocumentClass::builder("Company")
                .references_many("addresses", Options::new().as_role("addressable")),
        )
        .store(store.clone())
        .build()
        .expect("build session");
    (session, store)
}

fn create(session: &Session, class: &str, attributes: Attributes) -> DocumentRef {
    session
        .klass(class)
        .and_then(|klass| klass.create(attributes))
        .expect("create document")
}

#[test]
fn assigning_parent_to_unsaved_child_writes_the_foreign_key() {
    let (session, store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let post = session.new_document("Post", attrs! { "title" => "t" }).unwrap();

    post.set_relation("person", &person).unwrap();

    assert_eq!(post.get("person_id"), Some(person.id()));
    assert!(post.one("person").unwrap().unwrap().ptr_eq(&person));
    assert!(!person.relation_exists("posts"));
    assert!(person.is_new_record());
    assert!(post.is_new_record());
    assert_eq!(store.len("posts"), 0);
}

#[test]
fn appending_to_unsaved_parent_binds_without_saving() {
    let (session, store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let post = session.new_document("Post", attrs! { "title" => "t" }).unwrap();

    let posts = person.many("posts").unwrap();
    posts.push(&post).unwrap();
    posts.push(&post).unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(post.get("person_id"), Some(person.id()));
    assert!(post.one("person").unwrap().unwrap().ptr_eq(&person));
    assert!(post.is_new_record());
    assert_eq!(store.len("posts"), 0);
}

#[test]
fn relation_getter_is_memoized() {
    let (session, _store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let first = person.many("posts").unwrap();
    let second = person.many("posts").unwrap();
    assert!(first.ptr_eq(&second));
    assert!(person.relation_exists("posts"));
}

#[test]
fn appending_to_persisted_parent_saves_the_child() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let post = session.new_document("Post", attrs! { "title" => "t" }).unwrap();

    person.many("posts").unwrap().push(&post).unwrap();

    assert!(post.is_persisted());
    let stored = store.get("posts", &post.id()).unwrap();
    assert_eq!(stored.get("person_id"), Some(&person.id()));

    let reloaded = session
        .klass("Person")
        .unwrap()
        .find_by_id(&person.id())
        .unwrap()
        .unwrap();
    let posts = reloaded.many("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts.first().unwrap(), post);
}

#[test]
fn build_does_not_save_but_create_does() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();

    let built = posts.build(attrs! { "title" => "draft" }).unwrap();
    assert!(built.is_new_record());
    assert_eq!(built.get("person_id"), Some(person.id()));

    let created = posts.create(attrs! { "title" => "live" }).unwrap();
    assert!(created.is_persisted());
    assert_eq!(posts.len(), 2);
    assert_eq!(store.len("posts"), 1);
}

#[test]
fn building_on_unsaved_parent_links_without_saving() {
    let (session, store) = setup();
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let posts = person.many("posts").unwrap();

    let post = posts.build(attrs! { "title" => "draft" }).unwrap();

    assert!(!post.is_persisted());
    assert_eq!(post.get("person_id"), Some(person.id()));
    assert_eq!(posts.target(), vec![post.clone()]);
    assert!(post.one("person").unwrap().unwrap().ptr_eq(&person));
    assert_eq!(store.len("posts"), 0);
    assert_eq!(store.len("people"), 0);
}

#[test]
fn destroy_all_filters_target_and_store_independently() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();
    posts.create(attrs! { "title" => "x" }).unwrap();
    posts.create(attrs! { "title" => "y" }).unwrap();

    let removed = posts
        .destroy_all(Some(Selector::new().eq("title", "y")))
        .unwrap();

    assert_eq!(removed, 1);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts.first().unwrap().get("title"), Some(Value::from("x")));
    assert_eq!(store.len("posts"), 1);
}

#[test]
fn delete_all_without_conditions_empties_the_relation() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let other = create(&session, "Person", attrs! { "name" => "q" });
    let posts = person.many("posts").unwrap();
    posts.create(attrs! { "title" => "a" }).unwrap();
    posts.create(attrs! { "title" => "b" }).unwrap();
    other.many("posts").unwrap().create(attrs! { "title" => "c" }).unwrap();

    assert_eq!(posts.delete_all(None).unwrap(), 2);
    assert!(posts.is_empty());
    assert_eq!(store.len("posts"), 1);
}

#[test]
fn assigning_nil_to_persisted_parent_deletes_owned_documents() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();
    let first = posts.create(attrs! { "title" => "a" }).unwrap();
    let second = posts.create(attrs! { "title" => "b" }).unwrap();
    assert!(first.one("person").unwrap().is_some());

    person.set_relation("posts", Assign::Nil).unwrap();

    assert_eq!(store.len("posts"), 0);
    assert!(first.is_destroyed());
    assert!(second.is_destroyed());
    assert_eq!(first.get("person_id"), Some(Value::Null));
    assert!(first.one("person").unwrap().is_none());
    assert!(second.one("person").unwrap().is_none());
    assert!(person.many("posts").unwrap().is_empty());
}

#[test]
fn substituting_a_new_list_unbinds_dropped_documents() {
    let (session, _store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let kept = person.many("posts").unwrap().create(attrs! { "title" => "a" }).unwrap();
    let added = session.new_document("Post", attrs! { "title" => "b" }).unwrap();

    person.set_relation("posts", vec![added.clone()]).unwrap();

    let posts = person.many("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert!(posts.contains(&added));
    assert!(added.is_persisted());
    assert_eq!(added.get("person_id"), Some(person.id()));
    assert_eq!(kept.get("person_id"), Some(Value::Null));
    assert!(kept.one("person").unwrap().is_none());
}

#[test]
fn find_is_scoped_to_the_relation() {
    let (session, _store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let other = create(&session, "Person", attrs! { "name" => "q" });
    let posts = person.many("posts").unwrap();
    let a = posts.create(attrs! { "title" => "a" }).unwrap();
    posts.create(attrs! { "title" => "b" }).unwrap();
    other.many("posts").unwrap().create(attrs! { "title" => "a" }).unwrap();

    assert_eq!(posts.find(Find::All, None).unwrap().into_many().len(), 2);
    let first_a = posts
        .find(Find::First, Some(Selector::new().eq("title", "a")))
        .unwrap()
        .into_one();
    assert_eq!(first_a, Some(a.clone()));
    assert_eq!(posts.find(Find::Id(a.id()), None).unwrap().into_one(), Some(a));
    assert_eq!(posts.count().unwrap(), 2);

    let err = posts.find(Find::Id(Value::from("missing")), None).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn destroying_a_loaded_copy_cascades_to_stored_children() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();
    posts.create(attrs! { "title" => "a" }).unwrap();
    posts.create(attrs! { "title" => "b" }).unwrap();

    let copy = session
        .klass("Person")
        .unwrap()
        .find_by_id(&person.id())
        .unwrap()
        .unwrap();
    copy.destroy().unwrap();

    assert!(copy.is_destroyed());
    assert_eq!(store.len("posts"), 0);
    assert_eq!(store.len("people"), 0);
}

#[test]
fn nullify_keeps_the_dependent_document() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let game = person.create_one("game", attrs! { "score" => 1 }).unwrap();
    assert!(game.is_persisted());
    assert_eq!(game.get("person_id"), Some(person.id()));
    assert!(game.one("person").unwrap().unwrap().ptr_eq(&person));

    person.destroy().unwrap();

    let stored = store.get("games", &game.id()).unwrap();
    assert_eq!(stored.get("person_id"), Some(&Value::Null));
    assert_eq!(store.len("people"), 0);
}

#[test]
fn clearing_references_one_deletes_the_target() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let game = person.create_one("game", attrs! { "score" => 1 }).unwrap();

    assert!(person.set_relation("game", Assign::Nil).unwrap().is_none());

    assert!(game.is_destroyed());
    assert_eq!(store.len("games"), 0);
    assert!(person.one("game").unwrap().is_none());
}

#[test]
fn clearing_referenced_in_keeps_the_parent() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let post = person.many("posts").unwrap().create(attrs! { "title" => "a" }).unwrap();

    post.set_relation("person", Assign::Nil).unwrap();

    assert_eq!(post.get("person_id"), Some(Value::Null));
    assert!(post.one("person").unwrap().is_none());
    assert!(person.is_persisted());
    assert_eq!(store.len("people"), 1);
}

#[test]
fn polymorphic_children_resolve_their_owner_class() {
    let (session, _store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let company = create(&session, "Company", attrs! {});
    let home = person
        .many("addresses")
        .unwrap()
        .create(attrs! { "street" => "Main" })
        .unwrap();
    company
        .many("addresses")
        .unwrap()
        .create(attrs! { "street" => "Dock" })
        .unwrap();

    assert_eq!(home.get("addressable_id"), Some(person.id()));
    assert_eq!(home.get("addressable_type"), Some(Value::from("Person")));

    let loaded = session
        .klass("Address")
        .unwrap()
        .find_by_id(&home.id())
        .unwrap()
        .unwrap();
    let owner = loaded.one("addressable").unwrap().unwrap();
    assert_eq!(owner.class_name(), "Person");
    assert_eq!(owner, person);

    let reloaded_company = session
        .klass("Company")
        .unwrap()
        .find_by_id(&company.id())
        .unwrap()
        .unwrap();
    assert_eq!(reloaded_company.many("addresses").unwrap().len(), 1);
}

#[test]
fn polymorphic_inverse_is_found_by_role() {
    let (session, _store) = setup();
    let address = session.registry().resolve("Address").unwrap();
    let person = session.registry().resolve("Person").unwrap();
    let addressable = address.relation("addressable").unwrap();
    assert_eq!(addressable.inverse(Some(person.as_ref())), Some("addresses".to_string()));
    assert_eq!(
        addressable.inverse_metadata(&person).map(|m| m.name().to_string()),
        Some("addresses".to_string())
    );
}

#[test]
fn array_relation_keeps_ids_on_the_owner() {
    let (session, store) = setup();
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let preference = person
        .many("preferences")
        .unwrap()
        .create(attrs! { "name" => "dark" })
        .unwrap();

    let stored = store.get("people", &person.id()).unwrap();
    assert_eq!(
        stored.get("preference_ids"),
        Some(&Value::Array(vec![preference.id()]))
    );

    let reloaded = session
        .klass("Person")
        .unwrap()
        .find_by_id(&person.id())
        .unwrap()
        .unwrap();
    let preferences = reloaded.many("preferences").unwrap();
    assert_eq!(preferences.len(), 1);

    assert_eq!(preferences.delete_all(None).unwrap(), 1);
    assert_eq!(store.len("preferences"), 0);
    let stored = store.get("people", &person.id()).unwrap();
    assert_eq!(stored.get("preference_ids"), Some(&Value::Array(Vec::new())));
}

#[test]
fn relation_proxy_outliving_its_owner_fails() {
    let (session, _store) = setup();
    let posts = {
        let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
        person.many("posts").unwrap()
    };
    let err = posts.build(attrs! { "title" => "t" }).unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::BaseDropped));
}

#[test]
fn unknown_and_unsupported_relations_are_errors() {
    let session = SessionBuilder::new()
        .class(DocumentClass::builder("Post").references_and_referenced_in_many("tags", Options::new()))
        .class(DocumentClass::builder("Tag"))
        .build()
        .unwrap();
    let post = session.new_document("Post", attrs! {}).unwrap();

    let err = post.relation("comments").unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::UnknownRelation));

    let err = post.relation("tags").unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::Unsupported));

    let class = post.class();
    let tags: &Metadata = class.relation("tags").unwrap();
    assert_eq!(tags.class_name(), "Tag");
}
