//! Convenient re-exports of commonly used types.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use bson::{Bson, Document, doc, oid::ObjectId};

pub use docmodel_core::{
    ID_FIELD,
    accessor::Accessors,
    backend::{DynStoreBackend, FindOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    builder::QueryBuilder,
    cast::{Cast, Casts},
    collection::Collection,
    entity::{Entity, FieldValue, ToArrayOptions},
    entity_set::{EagerLoad, EntitySet, Record},
    error::{DocumentStoreError, DocumentStoreResult},
    model::{Model, Schema},
    page::{Page, PaginationParams},
    pipeline::SortDirection,
    query::{Combinator, Expr, FieldOp, Filter},
    relation::{AnyEntity, Cardinality, Related, RelationDescriptor, Relations},
    repository::Repository,
    scope::Scopes,
    store::DocumentStore,
};

pub use docmodel_memory::InMemoryStore;
