//! Core of the docmodel object document mapper.
//!
//! This crate provides:
//!
//! - **Driver abstraction** ([`backend`]) - Traits every document store driver implements
//! - **Expressions** ([`query`]) - Filter trees with AND/OR folding and grouping
//! - **Pipelines** ([`pipeline`]) - Aggregation stages rendered in call order
//! - **Models** ([`model`], [`entity`]) - Model declarations and the entity lifecycle with hooks
//! - **Entity sets** ([`entity_set`]) - Ordered result containers with grouping and eager loading
//! - **Relations** ([`relation`]) - Has-one and has-many declarations and their resolution
//! - **Query builder** ([`builder`]) - Fluent queries terminating in driver calls
//! - **Casts, accessors and scopes** ([`cast`], [`accessor`], [`scope`]) - Per-model value rules
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::{model::Model, relation::{Relations, RelationDescriptor}};
//!
//! pub struct Post;
//!
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn relations() -> Relations {
//!         Relations::new().relation("comments", RelationDescriptor::has_many::<Comment>())
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

/// Field holding a document's identity.
pub const ID_FIELD: &str = "_id";

pub mod accessor;
pub mod backend;
pub mod builder;
pub mod cast;
pub mod collection;
pub mod entity;
pub mod entity_set;
pub mod error;
pub mod model;
pub mod page;
pub mod pipeline;
pub mod query;
pub mod relation;
pub mod repository;
pub mod scope;
pub mod store;
pub mod value;
