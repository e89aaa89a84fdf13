//! Model definitions.
//!
//! A model is a marker type describing one kind of stored document: the collection it lives
//! in, its relations, casts, accessors and scopes, and the lifecycle hooks fired around
//! single-entity writes. Per-model metadata is gathered once per store into a [`Schema`].
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! pub struct Post;
//!
//! impl Model for Post {
//!     const NAME: &'static str = "Post";
//!
//!     fn relations() -> Relations {
//!         Relations::new().relation("comments", RelationDescriptor::has_many::<Comment>())
//!     }
//!
//!     fn casts() -> Casts {
//!         Casts::new().cast("views", Cast::Integer)
//!     }
//! }
//! ```

use bson::DateTime;
use std::fmt;

use crate::{
    accessor::Accessors,
    cast::Casts,
    entity::Entity,
    error::DocumentStoreResult,
    relation::Relations,
    scope::Scopes,
};

/// Attribute stamped by the default `before_create` hook.
pub const CREATED_AT: &str = "created_at";
/// Attribute stamped by the default `before_update` hook.
pub const UPDATED_AT: &str = "updated_at";

/// A typed document kind.
///
/// Only [`NAME`](Model::NAME) is required. Every hook defaults to a no-op except
/// `before_create` and `before_update`, which stamp [`CREATED_AT`] and [`UPDATED_AT`]. A hook
/// returning an error aborts the remaining lifecycle steps; nothing is rolled back.
pub trait Model: Sized + Send + Sync + 'static {
    /// The model's type name. Key inference and the default source are derived from it.
    const NAME: &'static str;

    /// Name of the backing collection. Defaults to the lowercased [`NAME`](Model::NAME).
    fn source() -> String {
        Self::NAME.to_lowercase()
    }

    fn relations() -> Relations {
        Relations::new()
    }

    fn casts() -> Casts {
        Casts::new()
    }

    fn accessors() -> Accessors {
        Accessors::new()
    }

    fn scopes() -> Scopes<Self> {
        Scopes::new()
    }

    fn before_save(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn after_save(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn before_create(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        entity.set(CREATED_AT, DateTime::now());
        Ok(())
    }

    fn after_create(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn before_update(entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        entity.set(UPDATED_AT, DateTime::now());
        Ok(())
    }

    fn after_update(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn before_delete(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn after_delete(_entity: &mut Entity<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }
}

/// Metadata of one model, built once per store.
pub struct Schema<M: Model> {
    pub source: String,
    pub relations: Relations,
    pub casts: Casts,
    pub accessors: Accessors,
    pub scopes: Scopes<M>,
}

impl<M: Model> Schema<M> {
    pub fn build() -> Self {
        Self {
            source: M::source(),
            relations: M::relations(),
            casts: M::casts(),
            accessors: M::accessors(),
            scopes: M::scopes(),
        }
    }
}

impl<M: Model> fmt::Debug for Schema<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("model", &M::NAME)
            .field("source", &self.source)
            .field("relations", &self.relations)
            .field("casts", &self.casts)
            .field("accessors", &self.accessors)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Lifecycle hooks, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::BeforeSave => "before_save",
            Hook::AfterSave => "after_save",
            Hook::BeforeCreate => "before_create",
            Hook::AfterCreate => "after_create",
            Hook::BeforeUpdate => "before_update",
            Hook::AfterUpdate => "after_update",
            Hook::BeforeDelete => "before_delete",
            Hook::AfterDelete => "after_delete",
        }
    }

    pub(crate) fn fire<M: Model>(self, entity: &mut Entity<M>) -> DocumentStoreResult<()> {
        log::trace!("{} {} on {:?}", M::NAME, self, entity.id());

        match self {
            Hook::BeforeSave => M::before_save(entity),
            Hook::AfterSave => M::after_save(entity),
            Hook::BeforeCreate => M::before_create(entity),
            Hook::AfterCreate => M::after_create(entity),
            Hook::BeforeUpdate => M::before_update(entity),
            Hook::AfterUpdate => M::after_update(entity),
            Hook::BeforeDelete => M::before_delete(entity),
            Hook::AfterDelete => M::after_delete(entity),
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
