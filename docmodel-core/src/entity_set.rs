//! Ordered, indexable sets of entities or raw records.
//!
//! An [`EntitySet`] is 0-indexed and tolerates gaps: [`EntitySet::unset`] removes a position
//! without shifting the ones after it. The batch helpers (`group_by`, `key_by`, `pluck`,
//! `combine`, `chunk`) work the same over raw documents and entities through [`Record`].

use bson::{Bson, Document, doc};
use indexmap::IndexMap;
use std::{any::TypeId, collections::BTreeMap, fmt};

use crate::{
    ID_FIELD,
    backend::FindOptions,
    entity::{Entity, ToArrayOptions},
    error::DocumentStoreResult,
    model::Model,
    relation::{AnyEntity, Cardinality, Related, infer_key_field, singular_name},
    value,
};

/// A member of an [`EntitySet`].
pub trait Record {
    /// The stored identity, if any.
    fn identity(&self) -> Option<Bson>;

    /// The value of `field`, or `None` when absent.
    fn value(&self, field: &str) -> Option<Bson>;

    /// Plain rendering used for array and JSON output.
    fn to_bson(&self) -> Bson;

    /// Value used for keying: the identity for `_id`, the field value otherwise.
    fn key_value(&self, field: &str) -> Option<Bson> {
        let value = if field == ID_FIELD {
            self.identity()
        } else {
            self.value(field)
        };

        value.filter(|value| *value != Bson::Null)
    }
}

impl Record for Document {
    fn identity(&self) -> Option<Bson> {
        self.get(ID_FIELD).cloned()
    }

    fn value(&self, field: &str) -> Option<Bson> {
        self.get(field).cloned()
    }

    fn to_bson(&self) -> Bson {
        Bson::Document(self.clone())
    }
}

impl<M: Model> Record for Entity<M> {
    fn identity(&self) -> Option<Bson> {
        self.id().map(Bson::ObjectId)
    }

    fn value(&self, field: &str) -> Option<Bson> {
        self.get(field)
    }

    fn to_bson(&self) -> Bson {
        Bson::Document(self.to_array(&ToArrayOptions::default()))
    }
}

impl Record for Box<dyn AnyEntity> {
    fn identity(&self) -> Option<Bson> {
        self.entity_id().map(Bson::ObjectId)
    }

    fn value(&self, field: &str) -> Option<Bson> {
        self.attribute(field)
    }

    fn to_bson(&self) -> Bson {
        Bson::Document(self.to_any_array())
    }
}

/// Overrides for [`EntitySet::eager_load`]. Unset fields fall back to the owner's declared
/// relation, or to naming convention when none targets the related model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EagerLoad {
    pub field: Option<String>,
    pub local_key: Option<String>,
    pub foreign_key: Option<String>,
}

impl EagerLoad {
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = Some(local_key.into());
        self
    }

    pub fn foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet<T> {
    items: BTreeMap<usize, T>,
}

impl<T> EntitySet<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(&index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(&index)
    }

    /// Stores `item` at `index`, returning what was there before.
    pub fn set(&mut self, index: usize, item: T) -> Option<T> {
        self.items.insert(index, item)
    }

    /// Removes the item at `index` without shifting later positions.
    pub fn unset(&mut self, index: usize) -> Option<T> {
        self.items.remove(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.items.contains_key(&index)
    }

    /// Appends after the highest occupied position.
    pub fn push(&mut self, item: T) {
        let next = self
            .items
            .last_key_value()
            .map(|(index, _)| index + 1)
            .unwrap_or(0);
        self.items.insert(next, item);
    }

    pub fn first(&self) -> Option<&T> {
        self.items.values().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    /// Positions and items, in position order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items.iter().map(|(index, item)| (*index, item))
    }

    /// Splits the items into runs of at most `size`.
    pub fn chunk(&self, size: usize) -> Vec<Vec<&T>> {
        let items: Vec<&T> = self.iter().collect();
        items.chunks(size.max(1)).map(<[&T]>::to_vec).collect()
    }
}

impl<T: Record> EntitySet<T> {
    /// Groups items by the value of `field`; items without it are left out.
    pub fn group_by(&self, field: &str) -> IndexMap<String, Vec<&T>> {
        let mut groups: IndexMap<String, Vec<&T>> = IndexMap::new();
        for item in self.iter() {
            if let Some(key) = item.key_value(field) {
                groups.entry(value::key_string(&key)).or_default().push(item);
            }
        }
        groups
    }

    /// Keys items by the value of `field`; later items win on collisions.
    pub fn key_by(&self, field: &str) -> IndexMap<String, &T> {
        self.iter()
            .filter_map(|item| {
                item.key_value(field)
                    .map(|key| (value::key_string(&key), item))
            })
            .collect()
    }

    /// The value of `field` for each item, `Null` where absent.
    pub fn pluck(&self, field: &str) -> Vec<Bson> {
        self.iter()
            .map(|item| item.value(field).unwrap_or(Bson::Null))
            .collect()
    }

    /// Maps each item's `key` field to its `value_field` field.
    pub fn combine(&self, key: &str, value_field: &str) -> IndexMap<String, Bson> {
        self.iter()
            .map(|item| {
                (
                    value::key_string(&item.value(key).unwrap_or(Bson::Null)),
                    item.value(value_field).unwrap_or(Bson::Null),
                )
            })
            .collect()
    }

    pub fn to_array(&self) -> Vec<Bson> {
        self.iter().map(Record::to_bson).collect()
    }

    pub fn to_json(&self) -> DocumentStoreResult<String> {
        Ok(serde_json::to_string(&value::to_json_value(&Bson::Array(self.to_array())))?)
    }
}

impl<M: Model> EntitySet<Entity<M>> {
    /// Attaches the `R` entities related to every member with a single batched lookup.
    ///
    /// Distinct local key values are collected across the set and fetched with one
    /// `foreign_key $in [...]` query. Members whose key matches nothing get an empty relation.
    pub async fn eager_load<R: Model>(&mut self, options: EagerLoad) -> DocumentStoreResult<&mut Self> {
        let Some(store) = self.first().map(|entity| entity.store().clone()) else {
            return Ok(self);
        };
        let schema = store.schema::<M>();

        let (field, local, foreign, cardinality) =
            match schema.relations.targeting(TypeId::of::<R>()) {
                Some((name, descriptor)) => {
                    let (local, foreign) = descriptor.keys(M::NAME);
                    (name.to_string(), local, foreign, descriptor.cardinality())
                }
                None => (
                    singular_name(R::NAME),
                    infer_key_field(R::NAME),
                    ID_FIELD.to_string(),
                    Cardinality::One,
                ),
            };
        let field = options.field.unwrap_or(field);
        let local = options.local_key.unwrap_or(local);
        let foreign = options.foreign_key.unwrap_or(foreign);

        let mut keys: Vec<Bson> = Vec::new();
        for entity in self.iter() {
            if let Some(key) = entity.key_value(&local) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        let related = if keys.is_empty() {
            EntitySet::new()
        } else {
            let mut filter = Document::new();
            filter.insert(foreign.clone(), doc! { "$in": keys });
            store
                .repository::<R>()
                .find(filter, FindOptions::default())
                .await?
        };

        let grouped = related.group_by(&foreign);
        for entity in self.iter_mut() {
            let matches = entity
                .key_value(&local)
                .and_then(|key| grouped.get(&value::key_string(&key)))
                .map(Vec::as_slice)
                .unwrap_or_default();

            let relation = match cardinality {
                Cardinality::One => Related::One(
                    matches
                        .first()
                        .map(|related| Box::new((*related).clone()) as Box<dyn AnyEntity>),
                ),
                Cardinality::Many => Related::Many(
                    matches
                        .iter()
                        .map(|related| Box::new((*related).clone()) as Box<dyn AnyEntity>)
                        .collect(),
                ),
            };
            entity.set_relation(field.clone(), relation);
        }

        Ok(self)
    }
}

impl<T> Default for EntitySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for EntitySet<T> {
    fn from(items: Vec<T>) -> Self {
        items.into_iter().collect()
    }
}

impl<T> FromIterator<T> for EntitySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().enumerate().collect(),
        }
    }
}

impl<T> IntoIterator for EntitySet<T> {
    type Item = T;
    type IntoIter = std::collections::btree_map::IntoValues<usize, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}

impl<'a, T> IntoIterator for &'a EntitySet<T> {
    type Item = &'a T;
    type IntoIter = std::collections::btree_map::Values<'a, usize, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.values()
    }
}

impl<T: Record> fmt::Display for EntitySet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", value::to_json_value(&Bson::Array(self.to_array())))
    }
}
