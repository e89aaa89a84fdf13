//! An ActiveRecord-style object document mapper.
//!
//! This crate is the primary entry point. It re-exports the core types from `docmodel-core`
//! and the storage drivers from their own crates.
//!
//! # Features
//!
//! - **Models and entities** - Declare a model once, then create, update and delete entities
//!   with lifecycle hooks
//! - **Fluent queries** - Build filters and aggregation pipelines and run them against the store
//! - **Relations** - Has-one and has-many relations, resolved lazily or eager loaded in one lookup
//! - **Multiple backends** - In-memory and MongoDB drivers behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! pub struct Post;
//!
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn casts() -> Casts {
//!         Casts::new().cast("views", Cast::Integer)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::connect(InMemoryStore::builder().database("blog")).await?;
//!     let posts = store.repository::<Post>();
//!
//!     posts.create(doc! { "title": "Hello", "views": "12" }).await?;
//!
//!     let popular = posts
//!         .query()
//!         .r#where("views", FieldOp::Gt, 10)
//!         .order_by("views", SortDirection::Desc)
//!         .get()
//!         .await?;
//!
//!     println!("{popular}");
//!     store.shutdown().await
//! }
//! ```
//!
//! # Relations
//!
//! ```ignore
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn relations() -> Relations {
//!         Relations::new().relation("comments", RelationDescriptor::has_many::<Comment>())
//!     }
//! }
//!
//! let mut posts = store.repository::<Post>().query().get().await?;
//! posts.eager_load::<Comment>(EagerLoad::default()).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    ID_FIELD, accessor, backend, builder, cast, collection, entity, entity_set, error, model,
    page, pipeline, query, relation, repository, scope, store, value,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
