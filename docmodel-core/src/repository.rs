//! Typed entry point for one model.

use bson::{Bson, Document, oid::ObjectId};
use std::{fmt, sync::Arc};

use crate::{
    backend::FindOptions,
    builder::QueryBuilder,
    collection::Collection,
    entity::{Entity, id_filter},
    entity_set::EntitySet,
    error::{DocumentStoreError, DocumentStoreResult},
    model::{Model, Schema},
    store::DocumentStore,
};

/// Creates, finds and queries entities of model `M`.
pub struct Repository<M: Model> {
    store: DocumentStore,
    schema: Arc<Schema<M>>,
}

impl<M: Model> Repository<M> {
    pub(crate) fn new(store: DocumentStore, schema: Arc<Schema<M>>) -> Self {
        Self { store, schema }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn schema(&self) -> &Schema<M> {
        &self.schema
    }

    pub fn collection(&self) -> Collection {
        self.store.collection(&self.schema.source)
    }

    /// A new transient entity filled with `attributes`.
    pub fn make(&self, attributes: Document) -> Entity<M> {
        let mut entity = Entity::new(self.store.clone(), self.schema.clone());
        entity.fill(attributes);
        entity
    }

    /// Materializes a stored document.
    pub fn hydrate(&self, document: Document) -> Entity<M> {
        self.make(document)
    }

    /// Makes an entity from `attributes` and saves it.
    pub async fn create(&self, attributes: Document) -> DocumentStoreResult<Entity<M>> {
        let mut entity = self.make(attributes);
        entity.save().await?;
        Ok(entity)
    }

    /// Finds an entity by its hex identity.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] if `id` is not a valid identifier.
    pub async fn find_by_id(&self, id: &str) -> DocumentStoreResult<Option<Entity<M>>> {
        self.find_first(id_filter(parse_id(id)?)).await
    }

    pub async fn find_first(&self, filter: Document) -> DocumentStoreResult<Option<Entity<M>>> {
        Ok(self
            .collection()
            .find_one(filter)
            .await?
            .map(|document| self.hydrate(document)))
    }

    pub async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<EntitySet<Entity<M>>> {
        Ok(self
            .find_raw(filter, options)
            .await?
            .into_iter()
            .map(|document| self.hydrate(document))
            .collect())
    }

    pub async fn find_raw(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<EntitySet<Document>> {
        Ok(self
            .collection()
            .find(filter, options)
            .await?
            .into())
    }

    pub async fn aggregate(
        &self,
        pipeline: Vec<Document>,
    ) -> DocumentStoreResult<EntitySet<Entity<M>>> {
        Ok(self
            .aggregate_raw(pipeline)
            .await?
            .into_iter()
            .map(|document| self.hydrate(document))
            .collect())
    }

    pub async fn aggregate_raw(&self, pipeline: Vec<Document>) -> DocumentStoreResult<EntitySet<Document>> {
        Ok(self
            .collection()
            .aggregate(pipeline)
            .await?
            .into())
    }

    /// Deletes the document with the hex identity `id` without loading it. No hooks fire.
    pub async fn destroy(&self, id: &str) -> DocumentStoreResult<u64> {
        self.collection()
            .delete_one(id_filter(parse_id(id)?))
            .await
    }

    /// A query builder with the model's global scopes applied.
    pub fn query(&self) -> QueryBuilder<M> {
        self.schema
            .scopes
            .globals()
            .fold(QueryBuilder::new(self.clone()), |builder, (name, scope)| {
                log::trace!("applying global scope {name} to {}", M::NAME);
                scope(builder, &[] as &[Bson])
            })
    }
}

fn parse_id(id: &str) -> DocumentStoreResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| DocumentStoreError::InvalidIdentifier(id.to_string()))
}

impl<M: Model> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: self.schema.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("model", &M::NAME)
            .field("source", &self.schema.source)
            .finish()
    }
}
