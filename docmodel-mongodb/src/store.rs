use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions as MongoFindOptions},
};
use docmodel_core::{
    backend::{FindOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
};

fn driver_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn connect_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Initialization(err.to_string())
}

/// Driver backed by a MongoDB deployment.
///
/// Filters, updates and pipelines are sent as-is; they are already in MongoDB syntax.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// The underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn handle(&self, name: &str) -> MongoCollection<Document> {
        self.client.database(&self.database).collection(name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn find_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<Option<Document>> {
        self.handle(collection)
            .find_one(filter)
            .await
            .map_err(driver_error)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut find_options = MongoFindOptions::default();
        find_options.sort = options.sort;
        find_options.limit = options.limit;
        find_options.skip = options.skip;
        find_options.projection = options.projection;

        self.handle(collection)
            .find(filter)
            .with_options(find_options)
            .await
            .map_err(driver_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(driver_error)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        self.handle(collection)
            .aggregate(pipeline)
            .await
            .map_err(driver_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(driver_error)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        Ok(self
            .handle(collection)
            .insert_one(document)
            .await
            .map_err(driver_error)?
            .inserted_id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .handle(collection)
            .update_one(filter, update)
            .await
            .map_err(driver_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let result = self
            .handle(collection)
            .update_many(filter, update)
            .await
            .map_err(driver_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self
            .handle(collection)
            .delete_one(filter)
            .await
            .map_err(driver_error)?
            .deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        Ok(self
            .handle(collection)
            .delete_many(filter)
            .await
            .map_err(driver_error)?
            .deleted_count)
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.handle(collection)
            .count_documents(filter)
            .await
            .map_err(driver_error)
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// Parses a connection string and opens a client on [`build`](StoreBackendBuilder::build).
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        log::debug!("connecting to mongodb database {}", self.database);

        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(connect_error)?,
            )
            .map_err(connect_error)?,
            self.database,
        ))
    }
}
