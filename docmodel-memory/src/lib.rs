//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It evaluates filters, update documents and aggregation pipelines itself, which makes it a
//! drop-in driver for development and tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel_core::store::DocumentStore;
//! use docmodel_memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::connect(InMemoryStore::builder().database("blog")).await?;
//!     let post = store.repository::<Post>().create(bson::doc! { "title": "Hello" }).await?;
//!
//!     assert!(post.is_persisted());
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod store;
mod evaluator;
mod pipeline;
mod update;

pub use store::{DEFAULT_DATABASE, InMemoryStore, InMemoryStoreBuilder};
