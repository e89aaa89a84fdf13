//! Main document store interface.
//!
//! A [`DocumentStore`] owns one driver and hands out raw [`Collection`] handles and typed
//! [`Repository`] entry points. It is cheap to clone; clones share the driver, the memoised
//! database name and the per-model [`Schema`] cache.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let store = DocumentStore::connect(InMemoryStore::builder().database("blog")).await?;
//! let posts = store.repository::<Post>();
//! let post = posts.create(doc! { "title": "Hello", "views": 3 }).await?;
//! ```

use parking_lot::RwLock;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    collection::Collection,
    error::DocumentStoreResult,
    model::{Model, Schema},
    repository::Repository,
};

type SchemaCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

struct StoreInner {
    backend: Arc<dyn DynStoreBackend>,
    database: OnceLock<String>,
    schemas: SchemaCache,
}

/// A document store bound to a driver chosen at runtime.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl DocumentStore {
    /// Creates a new document store with the given backend.
    pub fn new<B: StoreBackend + 'static>(backend: B) -> Self {
        Self::from_dyn(Arc::new(backend))
    }

    /// Creates a store over an already type-erased driver.
    pub fn from_dyn(backend: Arc<dyn DynStoreBackend>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                database: OnceLock::new(),
                schemas: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Builds a driver and wraps it in a store.
    ///
    /// # Errors
    ///
    /// Returns whatever the builder fails with, typically
    /// [`DocumentStoreError::Initialization`](crate::error::DocumentStoreError::Initialization).
    pub async fn connect<Bld>(builder: Bld) -> DocumentStoreResult<Self>
    where
        Bld: StoreBackendBuilder,
        Bld::Backend: 'static,
    {
        Ok(Self::new(builder.build().await?))
    }

    pub fn backend(&self) -> &dyn DynStoreBackend {
        self.inner.backend.as_ref()
    }

    /// Returns the driver as its concrete type, if it is a `B`.
    pub fn backend_as<B: StoreBackend + 'static>(&self) -> Option<&B> {
        self.inner.backend.as_any().downcast_ref::<B>()
    }

    /// Name of the database, read from the driver on first use.
    pub fn database_name(&self) -> &str {
        self.inner
            .database
            .get_or_init(|| self.inner.backend.database_name().to_string())
    }

    /// Gets an untyped collection with the given name.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(name.to_string(), self.inner.backend.clone())
    }

    /// Gets the repository for model `M`.
    pub fn repository<M: Model>(&self) -> Repository<M> {
        Repository::new(self.clone(), self.schema::<M>())
    }

    /// Metadata of model `M`, built on first use and cached for the life of the store.
    pub fn schema<M: Model>(&self) -> Arc<Schema<M>> {
        let key = TypeId::of::<M>();

        if let Some(cached) = self.inner.schemas.read().get(&key).cloned() {
            if let Ok(schema) = cached.downcast::<Schema<M>>() {
                return schema;
            }
        }

        let built = Arc::new(Schema::<M>::build());
        let entry = self
            .inner
            .schemas
            .write()
            .entry(key)
            .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>)
            .clone();

        entry.downcast::<Schema<M>>().unwrap_or(built)
    }

    /// Cleanly shuts down the driver.
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.inner.backend.shutdown_dyn().await
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("backend", &self.inner.backend)
            .field("models", &self.inner.schemas.read().len())
            .finish()
    }
}
