//! Single addressable documents and their lifecycle.
//!
//! An [`Entity`] is either transient (no identity yet) or persisted. [`Entity::save`] routes to an
//! insert or a full update accordingly; every single-entity write fires the model's hooks in a
//! fixed order:
//!
//! | operation | hooks                                                                   |
//! |-----------|-------------------------------------------------------------------------|
//! | create    | `before_save`, `before_create`, insert, `after_create`, `after_save`   |
//! | save      | `before_save`, `before_update`, update, `after_update`, `after_save`   |
//! | update    | `before_save`, `before_update`, fill, update, `after_update`, `after_save` |
//! | delete    | `before_delete`, delete, `after_delete`                                 |
//!
//! `increment`, `decrement` and `unset_field` write a single field and fire no hooks.

use bson::{Bson, Document, doc, oid::ObjectId};
use indexmap::IndexMap;
use std::{any::Any, fmt, sync::Arc};

use crate::{
    ID_FIELD,
    collection::Collection,
    entity_set::EntitySet,
    error::{DocumentStoreError, DocumentStoreResult},
    model::{Hook, Model, Schema},
    relation::{self, AnyEntity, Cardinality, Related, RelationDescriptor},
    store::DocumentStore,
    value,
};

/// Top-level field filtering for [`Entity::to_array`].
///
/// When both are given, `include` wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToArrayOptions {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl ToArrayOptions {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(fields.into_iter().map(Into::into).collect()),
            exclude: None,
        }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: None,
            exclude: Some(fields.into_iter().map(Into::into).collect()),
        }
    }

    fn keeps(&self, field: &str) -> bool {
        match (&self.include, &self.exclude) {
            (Some(include), _) => include.iter().any(|f| f == field),
            (None, Some(exclude)) => !exclude.iter().any(|f| f == field),
            (None, None) => true,
        }
    }
}

/// Result of [`Entity::field`].
#[derive(Debug)]
pub enum FieldValue<'a> {
    Attribute(Bson),
    Relation(&'a Related),
}

/// One document of model `M`.
pub struct Entity<M: Model> {
    id: Option<ObjectId>,
    attributes: Document,
    relations: IndexMap<String, Related>,
    schema: Arc<Schema<M>>,
    store: DocumentStore,
}

impl<M: Model> Entity<M> {
    pub(crate) fn new(store: DocumentStore, schema: Arc<Schema<M>>) -> Self {
        Self {
            id: None,
            attributes: Document::new(),
            relations: IndexMap::new(),
            schema,
            store,
        }
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    /// The identity as hex, or an empty string while transient.
    pub fn id_string(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn attributes(&self) -> &Document {
        &self.attributes
    }

    pub fn relations(&self) -> &IndexMap<String, Related> {
        &self.relations
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

    /// Merges `data` into the entity.
    ///
    /// `_id` becomes the identity (only while transient), keys naming a declared relation are
    /// hydrated into the relation slot, and everything else is written through [`Entity::set`].
    pub fn fill(&mut self, data: Document) -> &mut Self {
        let schema = self.schema.clone();

        for (key, value) in data {
            if key == ID_FIELD {
                self.assign_id(value);
            } else if let Some(descriptor) = schema.relations.get(&key) {
                let related = self.hydrate_relation(descriptor, value);
                self.relations.insert(key, related);
            } else {
                self.set(key, value);
            }
        }

        self
    }

    /// Reads an attribute, applying the model's getter for `field` if one is declared.
    pub fn get(&self, field: &str) -> Option<Bson> {
        self.attributes
            .get(field)
            .cloned()
            .map(|value| self.schema.accessors.get(field, value))
    }

    /// Writes an attribute through the field's setter, or its cast when there is no setter.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        let field = field.into();
        let value = match self.schema.accessors.set(&field, value.into()) {
            Ok(value) => value,
            Err(value) => self.schema.casts.apply(&field, value),
        };

        self.attributes.insert(field, value);
        self
    }

    /// The cached relation `name`, without resolving it.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) -> &mut Self {
        self.relations.insert(name.into(), related);
        self
    }

    /// Reads `name` as an attribute, then as a cached relation, then by resolving the declared
    /// relation of that name. Resolved relations are cached on the entity.
    pub async fn field(&mut self, name: &str) -> DocumentStoreResult<Option<FieldValue<'_>>> {
        if let Some(value) = self.get(name).filter(|value| *value != Bson::Null) {
            return Ok(Some(FieldValue::Attribute(value)));
        }

        Ok(self.related(name).await?.map(FieldValue::Relation))
    }

    /// Returns relation `name`, resolving and caching it on first access.
    ///
    /// Returns `None` when the model declares no relation of that name.
    pub async fn related(&mut self, name: &str) -> DocumentStoreResult<Option<&Related>> {
        if !self.relations.contains_key(name) {
            let schema = self.schema.clone();
            let Some(descriptor) = schema.relations.get(name) else {
                log::debug!("{} declares no relation {name}", M::NAME);
                return Ok(None);
            };

            let related = relation::resolve(self, descriptor).await?;
            self.relations.insert(name.to_string(), related);
        }

        Ok(self.relations.get(name))
    }

    pub async fn related_one<R: Model>(
        &mut self,
        name: &str,
    ) -> DocumentStoreResult<Option<&Entity<R>>> {
        Ok(self.related(name).await?.and_then(|related| related.one::<R>()))
    }

    pub async fn related_many<R: Model>(
        &mut self,
        name: &str,
    ) -> DocumentStoreResult<Vec<&Entity<R>>> {
        Ok(self
            .related(name)
            .await?
            .map(|related| related.many::<R>())
            .unwrap_or_default())
    }

    /// Inserts a transient entity or writes the full attribute set of a persisted one.
    ///
    /// Fails with [`DocumentStoreError::DocumentNotFound`] when the persisted document is gone.
    pub async fn save(&mut self) -> DocumentStoreResult<&mut Self> {
        Hook::BeforeSave.fire(self)?;

        match self.id {
            Some(id) => {
                Hook::BeforeUpdate.fire(self)?;
                let outcome = self
                    .collection()
                    .update_one(id_filter(id), doc! { "$set": self.attributes.clone() })
                    .await?;
                if outcome.matched == 0 {
                    return Err(DocumentStoreError::DocumentNotFound(
                        id.to_hex(),
                        self.schema.source.clone(),
                    ));
                }
                Hook::AfterUpdate.fire(self)?;
            }
            None => {
                Hook::BeforeCreate.fire(self)?;
                let assigned = self
                    .collection()
                    .insert_one(self.attributes.clone())
                    .await?;
                self.id = Some(self.identity_of(assigned)?);
                Hook::AfterCreate.fire(self)?;
            }
        }

        Hook::AfterSave.fire(self)?;
        Ok(self)
    }

    /// Fills `attributes` and writes only the fields whose value changed, hook stamps included.
    pub async fn update(&mut self, attributes: Document) -> DocumentStoreResult<&mut Self> {
        let id = self.require_id()?;
        let before = self.attributes.clone();

        Hook::BeforeSave.fire(self)?;
        Hook::BeforeUpdate.fire(self)?;

        self.fill(attributes);

        let changed: Document = self
            .attributes
            .iter()
            .filter(|(field, value)| before.get(field.as_str()) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        if !changed.is_empty() {
            self.collection()
                .update_one(id_filter(id), doc! { "$set": changed })
                .await?;
        }

        Hook::AfterUpdate.fire(self)?;
        Hook::AfterSave.fire(self)?;
        Ok(self)
    }

    /// Adds `delta` to a numeric attribute and writes that field alone.
    pub async fn increment(
        &mut self,
        field: &str,
        delta: impl Into<Bson>,
    ) -> DocumentStoreResult<&mut Self> {
        let id = self.require_id()?;
        let current = self.get(field).unwrap_or(Bson::Null);
        let next = value::add(&current, &delta.into()).ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("{} field {field} is not numeric", M::NAME))
        })?;

        self.set(field, next);

        let mut set = Document::new();
        set.insert(field, self.attributes.get(field).cloned().unwrap_or(Bson::Null));

        self.collection()
            .update_one(id_filter(id), doc! { "$set": set })
            .await?;

        Ok(self)
    }

    pub async fn decrement(
        &mut self,
        field: &str,
        delta: impl Into<Bson>,
    ) -> DocumentStoreResult<&mut Self> {
        let delta = delta.into();
        let negated = value::negate(&delta).ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("cannot decrement {field} by {delta}"))
        })?;

        self.increment(field, negated).await
    }

    /// Deletes the stored document. The entity keeps its identity and attributes.
    pub async fn delete(&mut self) -> DocumentStoreResult<()> {
        let id = self.require_id()?;

        Hook::BeforeDelete.fire(self)?;
        self.collection().delete_one(id_filter(id)).await?;
        Hook::AfterDelete.fire(self)?;

        Ok(())
    }

    /// Removes the attribute at a dotted `path` and unsets it in the store.
    ///
    /// Returns `false` without touching the store when any segment of the path is absent, even
    /// on a transient entity. Removing a present field requires an identity.
    pub async fn unset_field(&mut self, path: &str) -> DocumentStoreResult<bool> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((leaf, parents)) = segments.split_last() else {
            return Ok(false);
        };

        let present = value::parent_mut(&mut self.attributes, parents)
            .is_some_and(|node| node.contains(leaf));
        if !present {
            return Ok(false);
        }

        let id = self.require_id()?;
        if let Some(node) = value::parent_mut(&mut self.attributes, parents) {
            node.remove(leaf);
        }

        let mut unset = Document::new();
        unset.insert(path, "");

        self.collection()
            .update_one(id_filter(id), doc! { "$unset": unset })
            .await?;

        Ok(true)
    }

    /// Plain rendering: `id`, then the filtered attributes, then every resolved relation.
    ///
    /// Identifiers become hex strings and date-times ISO-8601 text.
    pub fn to_array(&self, options: &ToArrayOptions) -> Document {
        let mut array = Document::new();
        array.insert("id", self.id_string());
        for (field, value) in &self.attributes {
            array.insert(field.clone(), value.clone());
        }

        let mut array: Document = array
            .into_iter()
            .filter(|(field, _)| options.keeps(field))
            .map(|(field, value)| (field, value::to_plain(value)))
            .collect();

        for (name, related) in &self.relations {
            array.insert(name.clone(), related.to_bson());
        }

        array
    }

    pub fn to_json(&self) -> DocumentStoreResult<String> {
        Ok(serde_json::to_string(&value::to_json_value(&Bson::Document(
            self.to_array(&ToArrayOptions::default()),
        )))?)
    }

    fn require_id(&self) -> DocumentStoreResult<ObjectId> {
        self.id
            .ok_or_else(|| DocumentStoreError::MissingIdentity(self.schema.source.clone()))
    }

    fn assign_id(&mut self, value: Bson) {
        if self.id.is_some() {
            log::debug!("{} identity is already assigned, ignoring {value}", M::NAME);
            return;
        }

        self.id = match value {
            Bson::ObjectId(id) => Some(id),
            Bson::String(hex) => ObjectId::parse_str(&hex).ok(),
            _ => None,
        };
    }

    fn identity_of(&self, assigned: Bson) -> DocumentStoreResult<ObjectId> {
        match assigned {
            Bson::ObjectId(id) => Ok(id),
            other => Err(DocumentStoreError::InvalidIdentifier(format!(
                "{other} assigned in {}",
                self.schema.source
            ))),
        }
    }

    fn hydrate_relation(&self, descriptor: &RelationDescriptor, value: Bson) -> Related {
        let related = descriptor.related();
        let documents: Vec<Document> = match value {
            Bson::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Bson::Document(doc) => Some(doc),
                    _ => None,
                })
                .collect(),
            Bson::Document(doc) => vec![doc],
            _ => Vec::new(),
        };

        match descriptor.cardinality() {
            Cardinality::One => Related::One(
                documents
                    .into_iter()
                    .next()
                    .map(|doc| related.hydrate(&self.store, doc)),
            ),
            Cardinality::Many => Related::Many(
                documents
                    .into_iter()
                    .map(|doc| related.hydrate(&self.store, doc))
                    .collect::<EntitySet<_>>(),
            ),
        }
    }
}

pub(crate) fn id_filter(id: ObjectId) -> Document {
    doc! { ID_FIELD: id }
}

impl<M: Model> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            attributes: self.attributes.clone(),
            relations: self.relations.clone(),
            schema: self.schema.clone(),
            store: self.store.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &M::NAME)
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("relations", &self.relations)
            .finish()
    }
}

impl<M: Model> fmt::Display for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let array = Bson::Document(self.to_array(&ToArrayOptions::default()));
        write!(f, "{}", value::to_json_value(&array))
    }
}

impl<M: Model> AnyEntity for Entity<M> {
    fn entity_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn model_name(&self) -> &'static str {
        M::NAME
    }

    fn attribute(&self, field: &str) -> Option<Bson> {
        self.get(field)
    }

    fn to_any_array(&self) -> Document {
        self.to_array(&ToArrayOptions::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn AnyEntity> {
        Box::new(self.clone())
    }
}
