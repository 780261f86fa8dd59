use std::rc::Rc;

use docmodel::prelude::*;
use docmodel::RelationErrorKind;

relation_accessors! {
    /// Typed access to a post's relations.
    pub trait PostRelations {
        one author, set_author;
        many comments, set_comments;
    }
}

fn blog(config: Config) -> (Session, Rc<MemoryStore>) {
    let store = Rc::new(MemoryStore::new());
    let session = SessionBuilder::new()
        .class(
            DocumentClass::builder("Person")
                .field("name")
                .references_many(
                    "posts",
                    Options::new().foreign_key("author_id").inverse_of("author"),
                ),
        )
        .class(
            DocumentClass::builder("Post")
                .field("title")
                .validates_presence_of("title")
                .referenced_in(
                    "author",
                    Options::new()
                        .class_name("Person")
                        .inverse_of("posts")
                        .index(true),
                )
                .embeds_many("comments", Options::new()),
        )
        .class(
            DocumentClass::builder("Comment")
                .field("body")
                .embedded_in("post", Options::new()),
        )
        .config(config)
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
fn create_keeps_invalid_documents_unsaved() {
    let (session, store) = blog(Config::default());
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();

    let post = posts.create(attrs! {}).unwrap();

    assert!(post.is_new_record());
    assert_eq!(post.errors().on("title").len(), 1);
    assert_eq!(post.get("author_id"), Some(person.id()));
    assert_eq!(store.len("posts"), 0);
}

#[test]
fn create_strict_reports_validation_errors() {
    let (session, store) = blog(Config::default());
    let person = create(&session, "Person", attrs! { "name" => "p" });

    let err = person.many("posts").unwrap().create_strict(attrs! {}).unwrap_err();

    assert!(err.is_validation());
    assert_eq!(store.len("posts"), 0);

    let post = person
        .many("posts")
        .unwrap()
        .create_strict(attrs! { "title" => "ok" })
        .unwrap();
    assert!(post.is_persisted());
}

#[test]
fn explicit_foreign_key_and_inverse_are_honored() {
    let (session, store) = blog(Config::default());
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let post = person
        .many("posts")
        .unwrap()
        .create(attrs! { "title" => "t" })
        .unwrap();

    assert_eq!(post.get("author_id"), Some(person.id()));
    assert!(post.author().unwrap().unwrap().ptr_eq(&person));

    let stored = store.get("posts", &post.id()).unwrap();
    assert_eq!(stored.get("author_id"), Some(&person.id()));
}

#[test]
fn typed_accessors_read_and_assign() {
    let (session, _store) = blog(Config::default());
    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let post = session.new_document("Post", attrs! { "title" => "t" }).unwrap();

    assert!(post.author().unwrap().is_none());
    post.set_author(&person).unwrap();
    assert_eq!(post.author().unwrap(), Some(person.clone()));

    let comment = session.new_document("Comment", attrs! { "body" => "hi" }).unwrap();
    post.set_comments(vec![comment.clone()]).unwrap();
    assert!(post.comments().unwrap().contains(&comment));
    assert!(comment.embedded_parent().unwrap().ptr_eq(&post));

    post.set_author(Assign::Nil).unwrap();
    assert!(post.author().unwrap().is_none());
    assert_eq!(post.get("author_id"), Some(Value::Null));
}

#[test]
fn missing_identity_raises_by_default() {
    let (session, _store) = blog(Config::default());
    let err = session
        .klass("Person")
        .unwrap()
        .find_by_id(&Value::from("missing"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(ref e) if e.class_name == "Person"));
}

#[test]
fn missing_identity_is_none_when_not_raising() {
    let (session, _store) = blog(Config::new().raise_not_found_error(false));
    let found = session
        .klass("Person")
        .unwrap()
        .find_by_id(&Value::from("missing"))
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn dynamic_fields_can_be_disabled() {
    let (session, _store) = blog(Config::new().allow_dynamic_fields(false));

    let err = session
        .new_document("Person", attrs! { "nickname" => "x" })
        .unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::UnknownField));

    let person = session.new_document("Person", attrs! { "name" => "p" }).unwrap();
    let err = person.set("nickname", "x").unwrap_err();
    assert_eq!(err.relation_kind(), Some(RelationErrorKind::UnknownField));

    let post = session
        .new_document("Post", attrs! { "title" => "t", "author_id" => person.id() })
        .unwrap();
    assert_eq!(post.get("author_id"), Some(person.id()));
}

#[test]
fn indexed_relations_create_indexes_when_enabled() {
    let (_session, store) = blog(Config::default());
    assert!(store.indexes().is_empty());

    let (_session, store) = blog(Config::new().autocreate_indexes(true));
    assert_eq!(
        store.indexes(),
        vec![("posts".to_string(), "author_id".to_string())]
    );
}

#[test]
fn config_json_feeds_the_session() {
    let session = SessionBuilder::new()
        .class(DocumentClass::builder("Person"))
        .config_json(r#"{"raise_not_found_error": false, "allow_dynamic_fields": false}"#)
        .unwrap()
        .build()
        .unwrap();
    assert!(!session.config().raise_not_found_error);
    assert!(!session.config().allow_dynamic_fields);
    assert!(!session.config().autocreate_indexes);

    let err = SessionBuilder::new().config_json("{not json").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn registry_rejects_unknown_classes_eagerly() {
    let err = SessionBuilder::new()
        .class(
            DocumentClass::builder("Post").referenced_in("author", Options::new().class_name("Writer")),
        )
        .build()
        .unwrap_err();
    match err {
        Error::Resolution(e) => {
            assert_eq!(e.class_name, "Writer");
            assert_eq!(e.referenced_from.as_deref(), Some("Post.author"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn registry_rejects_duplicate_classes() {
    let err = SessionBuilder::new()
        .class(DocumentClass::builder("Person"))
        .class(DocumentClass::builder("Person"))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn json_documents_convert_to_values() {
    let (session, _store) = blog(Config::default());
    let raw = serde_json::json!({
        "title": "imported",
        "comments": [{ "body": "first" }, { "body": "second" }],
    });
    let attributes = Attributes::from_value(Value::from(raw)).unwrap();

    let post = session.new_document("Post", attributes).unwrap();

    assert_eq!(post.get("title"), Some(Value::from("imported")));
    let comments = post.many("comments").unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments.get(1).unwrap().get("body"), Some(Value::from("second")));
}

#[test]
fn destroyed_documents_are_not_saved() {
    let (session, store) = blog(Config::default());
    let person = create(&session, "Person", attrs! { "name" => "p" });
    person.destroy().unwrap();

    assert!(!person.save().unwrap());
    assert!(person.save_strict().is_err());
    assert_eq!(store.len("people"), 0);
}

#[test]
fn reload_forgets_loaded_relations() {
    let (session, _store) = blog(Config::default());
    let person = create(&session, "Person", attrs! { "name" => "p" });
    let posts = person.many("posts").unwrap();
    assert!(posts.is_empty());

    let copy = session
        .klass("Person")
        .unwrap()
        .find_by_id(&person.id())
        .unwrap()
        .unwrap();
    copy.many("posts").unwrap().create(attrs! { "title" => "t" }).unwrap();

    assert!(person.many("posts").unwrap().is_empty());
    person.reload().unwrap();
    assert!(!person.relation_exists("posts"));
    assert_eq!(person.many("posts").unwrap().len(), 1);
}
