//! Storage driver abstraction for the document store.
//!
//! This module defines the narrow interface the mapping layer calls into. A driver executes
//! filters, update documents and aggregation pipelines against one database and returns plain
//! BSON documents; everything above it (models, query builders, relation loading) only ever
//! talks to a driver through these traits.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage drivers
//! - [`DynStoreBackend`]: A trait for dynamic dispatch over driver implementations
//! - [`StoreBackendBuilder`]: Factory trait for creating driver instances
//!
//! # Wire shape
//!
//! Filters are documents of `field -> { $op: value }`, combined under `$and` / `$or`.
//! Updates use `$set`, `$unset` and `$inc`. Pipelines are ordered lists of single-key stage
//! documents (`$match`, `$project`, `$lookup`, `$sort`, `$limit`, `$skip`, `$group`).

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{any::Any, fmt::Debug, sync::Arc};

use crate::error::DocumentStoreResult;

/// Options accepted by [`StoreBackend::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification, `field -> 1 | -1`.
    pub sort: Option<Document>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Projection specification, `field -> 1 | 0`.
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Result of an update call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Number of documents matched by the filter.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
}

/// Abstract interface for document store drivers.
///
/// # Thread Safety
///
/// All implementations must be thread-safe (`Send + Sync`). The mapping layer never issues
/// concurrent calls on its own, but a driver may be shared by many repositories.
///
/// # Error Handling
///
/// Store-level failures are returned as [`DocumentStoreError`](crate::error::DocumentStoreError)
/// and are never caught or retried by callers in this crate.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the name of the database this driver is bound to.
    fn database_name(&self) -> &str;

    /// Returns the first document in `collection` matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns every document in `collection` matching `filter`, shaped by `options`.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs an aggregation pipeline against `collection` and returns the output documents.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Inserts a document and returns the identity the store assigned to it.
    ///
    /// If the document carries an `_id` it is kept, otherwise the driver generates one.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter` and returns the number deleted.
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `filter` and returns the number deleted.
    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Cleanly shuts down the driver, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    fn database_name(&self) -> &str {
        StoreBackend::database_name(&**self)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::find_one(&**self, collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::find(&**self, collection, filter, options)
            .await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::aggregate(&**self, collection, pipeline).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        StoreBackend::insert_one(&**self, collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        StoreBackend::update_one(&**self, collection, filter, update)
            .await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        StoreBackend::update_many(&**self, collection, filter, update)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::delete_one(&**self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::delete_many(&**self, collection, filter).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::count(&**self, collection, filter).await
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(&**self).await
    }
}

#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    fn database_name(&self) -> &str;
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>>;
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>>;
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome>;
    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;
    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;
    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;
    async fn shutdown_dyn(&self) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    fn database_name(&self) -> &str {
        StoreBackend::database_name(self)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> DocumentStoreResult<Option<Document>> {
        StoreBackend::find_one(self, collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::find(self, collection, filter, options).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::aggregate(self, collection, pipeline).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        StoreBackend::insert_one(self, collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        StoreBackend::update_one(self, collection, filter, update).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        StoreBackend::update_many(self, collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::delete_one(self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::delete_many(self, collection, filter).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        StoreBackend::count(self, collection, filter).await
    }

    async fn shutdown_dyn(&self) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
