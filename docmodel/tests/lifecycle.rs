mod common;

use common::{Audited, Locked, Post, memory_store, recording_store, stamped, trail};
use docmodel::prelude::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn create_fires_hooks_around_a_single_insert() {
    let (store, recorder) = recording_store();

    let audited = store
        .repository::<Audited>()
        .create(doc! { "name": "first" })
        .await
        .unwrap();

    assert!(audited.is_persisted());
    assert_eq!(
        trail(&audited),
        vec!["before_save", "before_create", "after_create", "after_save"]
    );
    assert_eq!(recorder.calls(), vec!["insert_one audited".to_string()]);
}

#[tokio::test]
async fn save_on_persisted_entity_fires_update_hooks() {
    let store = memory_store().await;
    let mut audited = store
        .repository::<Audited>()
        .create(doc! { "name": "first" })
        .await
        .unwrap();

    audited.set("name", "second");
    audited.save().await.unwrap();

    assert_eq!(
        trail(&audited)[4..].to_vec(),
        vec!["before_save", "before_update", "after_update", "after_save"]
    );

    let stored = store
        .repository::<Audited>()
        .find_by_id(&audited.id_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("name"), Some(Bson::from("second")));
}

#[tokio::test]
async fn update_fires_hooks_and_writes_changed_fields() {
    let (store, recorder) = recording_store();
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello", "views": 1 })
        .await
        .unwrap();
    assert_eq!(stamped(&post), (true, false));
    recorder.reset();

    post.update(doc! { "views": "7" }).await.unwrap();

    assert_eq!(post.get("views"), Some(Bson::Int64(7)));
    assert_eq!(stamped(&post), (true, true));
    assert_eq!(recorder.calls(), vec!["update_one post".to_string()]);

    let stored = store
        .repository::<Post>()
        .find_by_id(&post.id_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("views"), Some(Bson::Int64(7)));
    assert_eq!(stored.get("title"), Some(Bson::from("Hello")));
}

#[tokio::test]
async fn audited_update_records_full_trail() {
    let store = memory_store().await;
    let mut audited = store
        .repository::<Audited>()
        .create(doc! { "name": "first" })
        .await
        .unwrap();

    audited.update(doc! { "name": "renamed" }).await.unwrap();

    assert_eq!(
        trail(&audited),
        vec![
            "before_save",
            "before_create",
            "after_create",
            "after_save",
            "before_save",
            "before_update",
            "after_update",
            "after_save",
        ]
    );
    assert_eq!(audited.get("name"), Some(Bson::from("renamed")));
}

#[tokio::test]
async fn delete_fires_hooks_and_keeps_the_entity() {
    let store = memory_store().await;
    let repository = store.repository::<Audited>();
    let mut audited = repository.create(doc! { "name": "doomed" }).await.unwrap();
    let id = audited.id_string();

    audited.delete().await.unwrap();

    assert_eq!(trail(&audited)[4..].to_vec(), vec!["before_delete", "after_delete"]);
    assert_eq!(audited.id_string(), id);
    assert!(repository.find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn failing_hook_aborts_the_delete() {
    let (store, recorder) = recording_store();
    let repository = store.repository::<Locked>();
    let mut locked = repository.create(doc! { "name": "keep" }).await.unwrap();
    recorder.reset();

    let err = locked.delete().await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::Hook(_)));
    assert_eq!(recorder.count("delete_one"), 0);
    assert!(repository.find_by_id(&locked.id_string()).await.unwrap().is_some());
}

#[tokio::test]
async fn transient_entities_reject_single_document_writes() {
    let (store, recorder) = recording_store();
    let mut post = store.repository::<Post>().make(doc! { "title": "draft" });

    let missing = |result: DocumentStoreResult<()>| {
        matches!(result, Err(DocumentStoreError::MissingIdentity(source)) if source == "post")
    };

    assert!(missing(post.update(doc! { "views": 1 }).await.map(|_| ())));
    assert!(missing(post.increment("views", 1).await.map(|_| ())));
    assert!(missing(post.delete().await));
    assert!(missing(post.unset_field("title").await.map(|_| ())));
    assert!(!post.unset_field("meta.missing").await.unwrap());

    assert!(recorder.calls().is_empty());
    assert_eq!(stamped(&post), (false, false));
}

#[tokio::test]
async fn increment_writes_one_field_without_hooks() {
    let (store, recorder) = recording_store();
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello", "views": 5 })
        .await
        .unwrap();
    recorder.reset();

    post.increment("views", 3).await.unwrap();
    post.decrement("views", 1).await.unwrap();

    assert_eq!(post.get("views"), Some(Bson::Int64(7)));
    assert_eq!(stamped(&post), (true, false));
    assert_eq!(
        recorder.calls(),
        vec!["update_one post".to_string(), "update_one post".to_string()]
    );

    let stored = store
        .repository::<Post>()
        .find_by_id(&post.id_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("views"), Some(Bson::Int64(7)));
}

#[tokio::test]
async fn increment_past_the_integer_range_widens_to_double() {
    let store = memory_store().await;
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello", "score": i64::MAX, "debt": i64::MIN })
        .await
        .unwrap();

    post.increment("score", 1).await.unwrap();
    post.decrement("debt", 1).await.unwrap();

    let score = Bson::Double(i64::MAX as f64 + 1.0);
    let debt = Bson::Double(i64::MIN as f64 - 1.0);
    assert_eq!(post.get("score"), Some(score.clone()));
    assert_eq!(post.get("debt"), Some(debt.clone()));

    let stored = store
        .repository::<Post>()
        .find_by_id(&post.id_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("score"), Some(score));
    assert_eq!(stored.get("debt"), Some(debt));
}

#[tokio::test]
async fn increment_rejects_non_numeric_fields() {
    let store = memory_store().await;
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello" })
        .await
        .unwrap();

    let err = post.increment("title", 1).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn unset_field_follows_dotted_paths() {
    let (store, recorder) = recording_store();
    let mut post = store
        .repository::<Post>()
        .create(doc! {
            "title": "Hello",
            "meta": { "tags": ["a", "b"], "author": { "name": "ann" } },
        })
        .await
        .unwrap();
    recorder.reset();

    assert!(post.unset_field("meta.author.name").await.unwrap());
    assert!(post.unset_field("meta.tags.0").await.unwrap());
    assert!(!post.unset_field("meta.missing.name").await.unwrap());
    assert!(!post.unset_field("meta.tags.0").await.unwrap());

    assert_eq!(recorder.count("update_one"), 2);

    let expected = doc! { "tags": [Bson::Null, "b"], "author": {} };
    assert_eq!(post.get("meta"), Some(Bson::Document(expected.clone())));

    let stored = store
        .repository::<Post>()
        .find_by_id(&post.id_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("meta"), Some(Bson::Document(expected)));
}

#[tokio::test]
async fn accessors_and_casts_shape_attributes() {
    let store = memory_store().await;
    let user_id = ObjectId::new();
    let mut post = store.repository::<Post>().make(doc! {
        "title": "  padded  ",
        "views": "42 views",
        "published": "0",
        "user_id": user_id.to_hex(),
    });
    post.set("slug", "Hello World");

    assert_eq!(post.get("title"), Some(Bson::from("padded")));
    assert_eq!(post.get("views"), Some(Bson::Int64(42)));
    assert_eq!(post.get("published"), Some(Bson::Boolean(false)));
    assert_eq!(post.get("user_id"), Some(Bson::ObjectId(user_id)));
    assert_eq!(post.get("slug"), Some(Bson::from("hello world")));
    assert_eq!(post.attributes().get("slug"), Some(&Bson::from("Hello World")));
}

#[tokio::test]
async fn identity_is_only_assigned_while_transient() {
    let store = memory_store().await;
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello" })
        .await
        .unwrap();
    let id = post.id();

    post.fill(doc! { "_id": ObjectId::new() });

    assert_eq!(post.id(), id);
}

#[tokio::test]
async fn find_by_id_rejects_malformed_identifiers() {
    let store = memory_store().await;

    let err = store.repository::<Post>().find_by_id("nope").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidIdentifier(id) if id == "nope"));
}

#[tokio::test]
async fn destroy_skips_hooks() {
    let store = memory_store().await;
    let repository = store.repository::<Locked>();
    let locked = repository.create(doc! { "name": "gone" }).await.unwrap();

    assert_eq!(repository.destroy(&locked.id_string()).await.unwrap(), 1);
    assert!(repository.find_by_id(&locked.id_string()).await.unwrap().is_none());
}

#[tokio::test]
async fn save_after_removal_reports_missing_document() {
    let store = memory_store().await;
    let repository = store.repository::<Audited>();
    let mut audited = repository.create(doc! { "name": "gone" }).await.unwrap();
    repository.destroy(&audited.id_string()).await.unwrap();

    audited.set("name", "back");
    let err = audited.save().await.unwrap_err();

    assert!(matches!(
        err,
        DocumentStoreError::DocumentNotFound(id, source)
            if id == audited.id_string() && source == "audited"
    ));
    assert_eq!(trail(&audited).last().map(String::as_str), Some("before_update"));
}

#[tokio::test]
async fn field_reads_attributes_before_relations() {
    let store = memory_store().await;
    let mut post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello" })
        .await
        .unwrap();

    assert!(matches!(
        post.field("title").await.unwrap(),
        Some(FieldValue::Attribute(Bson::String(title))) if title == "Hello"
    ));
    assert!(matches!(
        post.field("comments").await.unwrap(),
        Some(FieldValue::Relation(Related::Many(set))) if set.is_empty()
    ));
    assert!(post.field("nothing").await.unwrap().is_none());
}

#[tokio::test]
async fn array_and_json_rendering() {
    let store = memory_store().await;
    let post = store
        .repository::<Post>()
        .create(doc! { "title": "Hello", "views": 3 })
        .await
        .unwrap();

    let array = post.to_array(&ToArrayOptions::include(["id", "title"]));
    assert_eq!(array, doc! { "id": post.id_string(), "title": "Hello" });

    let array = post.to_array(&ToArrayOptions::exclude(["created_at"]));
    assert_eq!(
        array,
        doc! { "id": post.id_string(), "title": "Hello", "views": 3_i64 }
    );

    let json: serde_json::Value = serde_json::from_str(&post.to_json().unwrap()).unwrap();
    assert_eq!(json["id"], serde_json::Value::from(post.id_string()));
    assert_eq!(json["views"], serde_json::Value::from(3));
    assert!(json["created_at"].is_string());
}
