//! MongoDB driver for docmodel.
//!
//! Filters, update documents and aggregation pipelines rendered by the mapping layer are
//! already in MongoDB's native syntax, so this driver forwards them unchanged.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{store::DocumentStore, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::connect(
//!         MongoDbStore::builder("mongodb://localhost:27017", "blog"),
//!     )
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
