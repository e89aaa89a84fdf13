//! Relations between models.
//!
//! A [`RelationDescriptor`] records the related model, the cardinality and the key fields that
//! correlate owner and related documents. Descriptors are declared once per model through
//! [`Model::relations`](crate::model::Model::relations) and never change afterwards.
//!
//! Resolved relations are type-erased into [`Related`] so an entity can hold relations to any
//! number of other models; [`Related::one`] and [`Related::many`] recover the typed entities.
//!
//! # Key inference
//!
//! When a descriptor leaves a key unset, the key is derived from a model name: lowercased,
//! with one trailing `s` stripped, plus `_id` (`Comments` becomes `comment_id`).
//!
//! - one-to-one: local key inferred from the related model, foreign key `_id`
//! - one-to-many: local key `_id`, foreign key inferred from the owning model

use bson::{Bson, Document, oid::ObjectId};
use indexmap::IndexMap;
use std::{
    any::{Any, TypeId},
    fmt,
};

use crate::{
    ID_FIELD,
    backend::FindOptions,
    entity::Entity,
    entity_set::EntitySet,
    error::DocumentStoreResult,
    model::Model,
    store::DocumentStore,
};

/// Derives the conventional key field for a model name.
pub fn infer_key_field(model_name: &str) -> String {
    let name = model_name.to_lowercase();
    let name = name.strip_suffix('s').unwrap_or(&name);
    format!("{name}_id")
}

/// Lowercased, singular form of a model name, used as the default eager-load field.
pub fn singular_name(model_name: &str) -> String {
    let name = model_name.to_lowercase();
    name.strip_suffix('s').unwrap_or(&name).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Type-erased handle on a related model.
#[derive(Clone, Copy)]
pub struct RelatedType {
    name: &'static str,
    type_id: TypeId,
    source: fn() -> String,
    hydrate: fn(&DocumentStore, Document) -> Box<dyn AnyEntity>,
}

impl RelatedType {
    pub fn of<R: Model>() -> Self {
        Self {
            name: R::NAME,
            type_id: TypeId::of::<R>(),
            source: R::source,
            hydrate: hydrate_any::<R>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn source(&self) -> String {
        (self.source)()
    }

    /// Materializes a stored document as an entity of the related model.
    pub fn hydrate(&self, store: &DocumentStore, document: Document) -> Box<dyn AnyEntity> {
        (self.hydrate)(store, document)
    }
}

impl fmt::Debug for RelatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn hydrate_any<R: Model>(store: &DocumentStore, document: Document) -> Box<dyn AnyEntity> {
    Box::new(store.repository::<R>().hydrate(document))
}

/// Static description of how two models correlate.
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    related: RelatedType,
    cardinality: Cardinality,
    local_key: Option<String>,
    foreign_key: Option<String>,
}

impl RelationDescriptor {
    pub fn has_one<R: Model>() -> Self {
        Self {
            related: RelatedType::of::<R>(),
            cardinality: Cardinality::One,
            local_key: None,
            foreign_key: None,
        }
    }

    pub fn has_many<R: Model>() -> Self {
        Self {
            related: RelatedType::of::<R>(),
            cardinality: Cardinality::Many,
            local_key: None,
            foreign_key: None,
        }
    }

    pub fn local_key(mut self, field: impl Into<String>) -> Self {
        self.local_key = Some(field.into());
        self
    }

    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = Some(field.into());
        self
    }

    pub fn related(&self) -> &RelatedType {
        &self.related
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Returns the `(local, foreign)` key fields, filling unset keys by convention.
    pub fn keys(&self, owner: &str) -> (String, String) {
        let (default_local, default_foreign) = match self.cardinality {
            Cardinality::One => (infer_key_field(self.related.name), ID_FIELD.to_string()),
            Cardinality::Many => (ID_FIELD.to_string(), infer_key_field(owner)),
        };

        (
            self.local_key.clone().unwrap_or(default_local),
            self.foreign_key.clone().unwrap_or(default_foreign),
        )
    }
}

/// The relation registry of one model, keyed by relation name.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    relations: IndexMap<String, RelationDescriptor>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn relation(mut self, name: impl Into<String>, descriptor: RelationDescriptor) -> Self {
        self.relations.insert(name.into(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationDescriptor)> {
        self.relations
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    /// The first relation declared against the model with `type_id`.
    pub fn targeting(&self, type_id: TypeId) -> Option<(&str, &RelationDescriptor)> {
        self.iter()
            .find(|(_, descriptor)| descriptor.related.type_id == type_id)
    }
}

/// Type-erased entity, held in relation slots.
pub trait AnyEntity: Send + Sync + fmt::Debug {
    fn entity_id(&self) -> Option<ObjectId>;

    fn model_name(&self) -> &'static str;

    /// Reads an attribute through the model's getter, if any.
    fn attribute(&self, field: &str) -> Option<Bson>;

    /// Plain rendering of the entity with default options.
    fn to_any_array(&self) -> Document;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_box(&self) -> Box<dyn AnyEntity>;
}

impl dyn AnyEntity {
    /// Returns the typed entity if this is an entity of model `M`.
    pub fn downcast_ref<M: Model>(&self) -> Option<&Entity<M>> {
        self.as_any().downcast_ref::<Entity<M>>()
    }

    pub fn downcast_mut<M: Model>(&mut self) -> Option<&mut Entity<M>> {
        self.as_any_mut().downcast_mut::<Entity<M>>()
    }
}

impl Clone for Box<dyn AnyEntity> {
    fn clone(&self) -> Box<dyn AnyEntity> {
        self.clone_box()
    }
}

/// A resolved relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Box<dyn AnyEntity>>),
    Many(EntitySet<Box<dyn AnyEntity>>),
}

impl Related {
    pub fn empty(cardinality: Cardinality) -> Self {
        match cardinality {
            Cardinality::One => Related::One(None),
            Cardinality::Many => Related::Many(EntitySet::new()),
        }
    }

    /// The related entity of a one-to-one relation, typed as `R`.
    pub fn one<R: Model>(&self) -> Option<&Entity<R>> {
        match self {
            Related::One(Some(entity)) => entity.downcast_ref::<R>(),
            _ => None,
        }
    }

    /// The related entities of a one-to-many relation, typed as `R`.
    pub fn many<R: Model>(&self) -> Vec<&Entity<R>> {
        match self {
            Related::Many(set) => set
                .iter()
                .filter_map(|entity| entity.downcast_ref::<R>())
                .collect(),
            Related::One(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(entity) => entity.is_some() as usize,
            Related::Many(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Related::One(Some(entity)) => Bson::Document(entity.to_any_array()),
            Related::One(None) => Bson::Null,
            Related::Many(set) => Bson::Array(
                set.iter()
                    .map(|entity| Bson::Document(entity.to_any_array()))
                    .collect(),
            ),
        }
    }
}

/// Looks up the documents related to `owner` through `descriptor`.
///
/// An owner whose local key is its identity resolves to an empty relation without touching the
/// store while it is transient.
pub async fn resolve<M: Model>(
    owner: &Entity<M>,
    descriptor: &RelationDescriptor,
) -> DocumentStoreResult<Related> {
    let (local, foreign) = descriptor.keys(M::NAME);

    let value = if local == ID_FIELD {
        match owner.id() {
            Some(id) => Bson::ObjectId(id),
            None => {
                log::debug!("{} is transient, relation to {:?} left empty", M::NAME, descriptor.related);
                return Ok(Related::empty(descriptor.cardinality));
            }
        }
    } else {
        owner.get(&local).unwrap_or(Bson::Null)
    };

    let store = owner.store();
    let collection = store.collection(&descriptor.related.source());
    let mut filter = Document::new();
    filter.insert(foreign, value);

    Ok(match descriptor.cardinality {
        Cardinality::One => Related::One(
            collection
                .find_one(filter)
                .await?
                .map(|document| descriptor.related.hydrate(store, document)),
        ),
        Cardinality::Many => Related::Many(
            collection
                .find(filter, FindOptions::default())
                .await?
                .into_iter()
                .map(|document| descriptor.related.hydrate(store, document))
                .collect(),
        ),
    })
}
