#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use docmodel::{
    memory::InMemoryStore,
    model::{CREATED_AT, UPDATED_AT},
    prelude::*,
};

pub struct Post;
pub struct Comment;
pub struct User;

impl Model for Post {
    const NAME: &'static str = "Post";

    fn relations() -> Relations {
        Relations::new()
            .relation("comments", RelationDescriptor::has_many::<Comment>())
            .relation("user", RelationDescriptor::has_one::<User>())
    }

    fn casts() -> Casts {
        Casts::new()
            .cast("views", Cast::Integer)
            .cast("published", Cast::Boolean)
            .cast("user_id", Cast::Id)
    }

    fn accessors() -> Accessors {
        Accessors::new()
            .setter("title", |value| match value {
                Bson::String(title) => Bson::String(title.trim().to_string()),
                other => other,
            })
            .getter("slug", |value| match value {
                Bson::String(slug) => Bson::String(slug.to_lowercase()),
                other => other,
            })
    }

    fn scopes() -> Scopes<Self> {
        Scopes::new()
            .scope("published", |query, _| query.where_eq("published", true))
            .scope("popular", |query, args| {
                let threshold = args.first().cloned().unwrap_or(Bson::Int32(10));
                query.r#where("views", FieldOp::Gt, threshold)
            })
    }
}

impl Model for Comment {
    const NAME: &'static str = "Comment";

    fn relations() -> Relations {
        Relations::new().relation(
            "post",
            RelationDescriptor::has_one::<Post>().local_key("post_id"),
        )
    }

    fn casts() -> Casts {
        Casts::new().cast("post_id", Cast::Id)
    }
}

impl Model for User {
    const NAME: &'static str = "User";
}

/// Reads only published posts from the `post` collection.
pub struct PublishedPost;

impl Model for PublishedPost {
    const NAME: &'static str = "PublishedPost";

    fn source() -> String {
        "post".to_string()
    }

    fn scopes() -> Scopes<Self> {
        Scopes::new().global("published", |query, _| query.where_eq("published", true))
    }
}

/// Records every hook it goes through in its `trail` attribute.
pub struct Audited;

fn record(entity: &mut Entity<Audited>, hook: &str) -> DocumentStoreResult<()> {
    let mut trail = entity
        .get("trail")
        .and_then(|trail| trail.as_array().cloned())
        .unwrap_or_default();
    trail.push(Bson::String(hook.to_string()));
    entity.set("trail", trail);
    Ok(())
}

impl Model for Audited {
    const NAME: &'static str = "Audited";

    fn before_save(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "before_save")
    }

    fn after_save(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "after_save")
    }

    fn before_create(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "before_create")
    }

    fn after_create(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "after_create")
    }

    fn before_update(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "before_update")
    }

    fn after_update(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "after_update")
    }

    fn before_delete(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "before_delete")
    }

    fn after_delete(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        record(entity, "after_delete")
    }
}

/// Refuses to be deleted.
pub struct Locked;

impl Model for Locked {
    const NAME: &'static str = "Locked";

    fn before_delete(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Err(DocumentStoreError::Hook("locked records cannot be deleted".to_string()))
    }
}

pub fn trail(entity: &Entity<Audited>) -> Vec<String> {
    entity
        .get("trail")
        .and_then(|trail| trail.as_array().cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|hook| hook.as_str().map(str::to_string))
        .collect()
}

pub fn stamped(entity: &Entity<Post>) -> (bool, bool) {
    (
        matches!(entity.get(CREATED_AT), Some(Bson::DateTime(_))),
        matches!(entity.get(UPDATED_AT), Some(Bson::DateTime(_))),
    )
}

/// Wraps the in-memory driver and records every call as `"<operation> <collection>"`.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    fn record(&self, operation: &str, collection: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{operation} {collection}"));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

#[async_trait]
impl StoreBackend for RecordingStore {
    fn database_name(&self) -> &str {
        StoreBackend::database_name(&self.inner)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.record("find_one", collection);
        StoreBackend::find_one(&self.inner, collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.record("find", collection);
        StoreBackend::find(&self.inner, collection, filter, options).await
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        self.record("aggregate", collection);
        StoreBackend::aggregate(&self.inner, collection, pipeline).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.record("insert_one", collection);
        StoreBackend::insert_one(&self.inner, collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.record("update_one", collection);
        StoreBackend::update_one(&self.inner, collection, filter, update).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.record("update_many", collection);
        StoreBackend::update_many(&self.inner, collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.record("delete_one", collection);
        StoreBackend::delete_one(&self.inner, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.record("delete_many", collection);
        StoreBackend::delete_many(&self.inner, collection, filter).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.record("count", collection);
        StoreBackend::count(&self.inner, collection, filter).await
    }
}

/// A store over a fresh recording driver, plus a handle on the recorder.
pub fn recording_store() -> (DocumentStore, RecordingStore) {
    let recorder = RecordingStore::default();
    (DocumentStore::new(recorder.clone()), recorder)
}

pub async fn memory_store() -> DocumentStore {
    match DocumentStore::connect(InMemoryStore::builder().database("test")).await {
        Ok(store) => store,
        Err(err) => panic!("in-memory store failed to build: {err}"),
    }
}
