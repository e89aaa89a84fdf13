//! In-memory storage implementation for document stores.
//!
//! Collections are insertion-ordered vectors of BSON documents behind an async-aware
//! read-write lock. Every query scans the whole collection.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};

use docmodel_core::{
    ID_FIELD,
    backend::{FindOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    value,
};

use crate::{
    evaluator::{self, values_equal},
    pipeline::{CollectionSource, PipelineRunner},
    update::apply_update,
};

type StoreMap = HashMap<String, Vec<Document>>;

/// Name used when the builder is not given a database.
pub const DEFAULT_DATABASE: &str = "docmodel";

impl CollectionSource for StoreMap {
    fn documents(&self, collection: &str) -> &[Document] {
        self.get(collection).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable; clones share the same underlying data.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel_core::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new("blog");
/// let id = store.insert_one("post", doc! { "title": "Hello" }).await?;
/// let found = store.find_one("post", doc! { "_id": id }).await?;
/// assert!(found.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    database: String,
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections holding at least one document.
    pub async fn collections(&self) -> Vec<String> {
        self.store
            .read()
            .await
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let filter = evaluator::parse_filter(&filter)?;
        let mut store = self.store.write().await;
        let mut outcome = UpdateOutcome::default();

        let Some(documents) = store.get_mut(collection) else {
            return Ok(outcome);
        };

        for document in documents.iter_mut() {
            if !evaluator::matches(document, &filter)? {
                continue;
            }

            outcome.matched += 1;
            if apply_update(document, &update)? {
                outcome.modified += 1;
            }

            if !multi {
                break;
            }
        }

        Ok(outcome)
    }

    async fn delete(&self, collection: &str, filter: Document, multi: bool) -> DocumentStoreResult<u64> {
        let filter = evaluator::parse_filter(&filter)?;
        let mut store = self.store.write().await;

        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut doomed = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if evaluator::matches(document, &filter)? {
                doomed.push(index);
                if !multi {
                    break;
                }
            }
        }

        let mut index = 0;
        documents.retain(|_| {
            let keep = doomed.binary_search(&index).is_err();
            index += 1;
            keep
        });

        Ok(doomed.len() as u64)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<Option<Document>> {
        let filter = evaluator::parse_filter(&filter)?;
        let store = self.store.read().await;

        for document in store.documents(collection) {
            if evaluator::matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }

        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut pipeline = vec![bson::doc! { "$match": filter }];

        if let Some(sort) = options.sort {
            pipeline.push(bson::doc! { "$sort": sort });
        }
        if let Some(skip) = options.skip {
            pipeline.push(bson::doc! { "$skip": skip as i64 });
        }
        if let Some(limit) = options.limit {
            pipeline.push(bson::doc! { "$limit": limit });
        }
        if let Some(projection) = options.projection {
            pipeline.push(bson::doc! { "$project": projection });
        }

        self.aggregate(collection, pipeline).await
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store.documents(collection).to_vec();

        PipelineRunner::new(&*store).run(documents, &pipeline)
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> DocumentStoreResult<Bson> {
        let id = match document.get(ID_FIELD) {
            None | Some(Bson::Null) => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert(ID_FIELD, id.clone());
                id
            }
            Some(id) => id.clone(),
        };

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();
        if documents.is_empty() {
            log::trace!("creating in-memory collection {collection}");
        }

        if documents
            .iter()
            .any(|existing| existing.get(ID_FIELD).is_some_and(|other| values_equal(other, &id)))
        {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                value::key_string(&id),
                collection.to_string(),
            ));
        }

        documents.push(document);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update(collection, filter, update, false).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update(collection, filter, update, true).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.delete(collection, filter, false).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.delete(collection, filter, true).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        let filter = evaluator::parse_filter(&filter)?;
        let store = self.store.read().await;
        let mut count = 0;

        for document in store.documents(collection) {
            if evaluator::matches(document, &filter)? {
                count += 1;
            }
        }

        Ok(count)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel_core::store::DocumentStore;
///
/// let store = DocumentStore::connect(InMemoryStore::builder().database("blog")).await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    database: Option<String>,
}

impl InMemoryStoreBuilder {
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let database = self.database.unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        log::debug!("creating in-memory database {database}");

        Ok(InMemoryStore::new(database))
    }
}
