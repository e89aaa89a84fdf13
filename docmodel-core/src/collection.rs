//! Raw collection handle.
//!
//! A [`Collection`] binds a collection name to the store's driver and forwards plain BSON
//! filters, updates and pipelines. Models, repositories and query builders all reach the driver
//! through it.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let posts = store.collection("post");
//! let popular = posts
//!     .find(doc! { "views": { "$gt": 10 } }, FindOptions::default().limit(5))
//!     .await?;
//! ```

use bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    backend::{DynStoreBackend, FindOptions, UpdateOutcome},
    error::DocumentStoreResult,
};

/// A named collection on a dynamically dispatched driver.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    backend: Arc<dyn DynStoreBackend>,
}

impl Collection {
    pub(crate) fn new(name: String, backend: Arc<dyn DynStoreBackend>) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the driver fails.
    pub async fn find_one(&self, filter: Document) -> DocumentStoreResult<Option<Document>> {
        log::debug!("find_one {} {filter}", self.name);
        self.backend.find_one(&self.name, filter).await
    }

    /// Returns every document matching `filter`, shaped by `options`.
    pub async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        log::debug!("find {} {filter} {options:?}", self.name);
        self.backend.find(&self.name, filter, options).await
    }

    /// Runs an aggregation pipeline.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        log::debug!("aggregate {} {pipeline:?}", self.name);
        self.backend.aggregate(&self.name, pipeline).await
    }

    /// Inserts one document and returns the identity assigned to it.
    pub async fn insert_one(&self, document: Document) -> DocumentStoreResult<Bson> {
        log::debug!("insert_one {} {document}", self.name);
        self.backend.insert_one(&self.name, document).await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        log::debug!("update_one {} {filter} {update}", self.name);
        self.backend
            .update_one(&self.name, filter, update)
            .await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        log::debug!("update_many {} {filter} {update}", self.name);
        self.backend
            .update_many(&self.name, filter, update)
            .await
    }

    /// Deletes the first matching document and returns the number deleted.
    pub async fn delete_one(&self, filter: Document) -> DocumentStoreResult<u64> {
        log::debug!("delete_one {} {filter}", self.name);
        self.backend.delete_one(&self.name, filter).await
    }

    pub async fn delete_many(&self, filter: Document) -> DocumentStoreResult<u64> {
        log::debug!("delete_many {} {filter}", self.name);
        self.backend.delete_many(&self.name, filter).await
    }

    pub async fn count(&self, filter: Document) -> DocumentStoreResult<u64> {
        log::debug!("count {} {filter}", self.name);
        self.backend.count(&self.name, filter).await
    }
}
