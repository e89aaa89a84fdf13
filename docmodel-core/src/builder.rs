//! Fluent query builder.
//!
//! A [`QueryBuilder`] accumulates a filter tree ([`Predicates`]) and pipeline directives
//! ([`Pipeline`]) for one model. Chained calls consume and return the builder; terminal calls
//! borrow it, render the filter or the pipeline and call the driver.
//!
//! Comparison values, range bounds, membership values and bulk `update` values pass through the
//! model's cast table first, so comparing an identifier-cast field against a hex string matches
//! the stored identifier.
//!
//! # Example
//!
//! ```ignore
//! let popular = store
//!     .repository::<Post>()
//!     .query()
//!     .r#where("views", FieldOp::Gt, 10)
//!     .order_by("views", SortDirection::Desc)
//!     .limit(2, 0)
//!     .get()
//!     .await?;
//! ```

use bson::{Bson, Document, doc};
use std::fmt;

use crate::{
    backend::UpdateOutcome,
    entity::Entity,
    entity_set::EntitySet,
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    page::{Page, PaginationParams},
    pipeline::{AGGREGATE_FIELD, Accumulator, Group, Lookup, Pipeline, Sort, SortDirection},
    query::{Combinator, Expr, FieldOp, Filter, Predicates},
    repository::Repository,
    value,
};

pub struct QueryBuilder<M: Model> {
    repository: Repository<M>,
    predicates: Predicates,
    pipeline: Pipeline,
}

impl<M: Model> QueryBuilder<M> {
    /// A builder with no predicates and no stages. Global scopes are not applied.
    pub fn new(repository: Repository<M>) -> Self {
        Self {
            repository,
            predicates: Predicates::default(),
            pipeline: Pipeline::default(),
        }
    }

    pub fn repository(&self) -> &Repository<M> {
        &self.repository
    }

    pub fn predicates(&self) -> &Predicates {
        &self.predicates
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn cast(&self, field: &str, value: Bson) -> Bson {
        self.repository.schema().casts.apply(field, value)
    }

    fn push(mut self, combinator: Combinator, expr: Expr) -> Self {
        self.predicates.push(combinator, expr);
        self
    }

    fn comparison(&self, field: String, op: FieldOp, value: Bson) -> Expr {
        let value = match op {
            FieldOp::Matches => value,
            _ => self.cast(&field, value),
        };
        Expr::field(field, op, value)
    }

    /// Adds `field op value`, joined to the existing filter with AND.
    pub fn r#where(self, field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        let expr = self.comparison(field.into(), op, value.into());
        self.push(Combinator::And, expr)
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.r#where(field, FieldOp::Eq, value)
    }

    /// Adds `field op value`, joined to the existing filter with OR.
    pub fn or_where(self, field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        let expr = self.comparison(field.into(), op, value.into());
        self.push(Combinator::Or, expr)
    }

    pub fn or_where_eq(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.or_where(field, FieldOp::Eq, value)
    }

    /// Matches `low <= field <= high`.
    pub fn where_between(
        self,
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        let field = field.into();
        let low = self.cast(&field, low.into());
        let high = self.cast(&field, high.into());
        self.push(Combinator::And, Filter::between(field, low, high))
    }

    pub fn where_not_between(
        self,
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        let field = field.into();
        let low = self.cast(&field, low.into());
        let high = self.cast(&field, high.into());
        self.push(Combinator::And, Filter::not_between(field, low, high))
    }

    pub fn where_in<V: Into<Bson>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let field = field.into();
        let values: Vec<Bson> = values
            .into_iter()
            .map(|value| self.cast(&field, value.into()))
            .collect();
        self.push(Combinator::And, Filter::any_of(field, values))
    }

    pub fn where_not_in<V: Into<Bson>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let field = field.into();
        let values: Vec<Bson> = values
            .into_iter()
            .map(|value| self.cast(&field, value.into()))
            .collect();
        self.push(Combinator::And, Filter::none_of(field, values))
    }

    /// Adds a prebuilt expression as-is, without casting.
    pub fn where_expr(self, expr: Expr) -> Self {
        self.push(Combinator::And, expr)
    }

    pub fn or_where_expr(self, expr: Expr) -> Self {
        self.push(Combinator::Or, expr)
    }

    /// Builds a sub-filter on a fresh builder and adds it as one AND-joined node.
    ///
    /// ```ignore
    /// // (a = 1 AND b = 2) OR (c = 3 AND d = 4)
    /// posts.query()
    ///     .where_group(|q| q.where_eq("a", 1).where_eq("b", 2))
    ///     .or_where_group(|q| q.where_eq("c", 3).where_eq("d", 4));
    /// ```
    pub fn where_group<F>(self, group: F) -> Self
    where
        F: FnOnce(QueryBuilder<M>) -> QueryBuilder<M>,
    {
        self.group(Combinator::And, group)
    }

    pub fn or_where_group<F>(self, group: F) -> Self
    where
        F: FnOnce(QueryBuilder<M>) -> QueryBuilder<M>,
    {
        self.group(Combinator::Or, group)
    }

    fn group<F>(mut self, combinator: Combinator, group: F) -> Self
    where
        F: FnOnce(QueryBuilder<M>) -> QueryBuilder<M>,
    {
        let sub = group(QueryBuilder::new(self.repository.clone()));
        self.predicates.push_group(combinator, sub.predicates);
        self
    }

    /// Restricts the output to `fields`.
    pub fn columns<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.project(fields);
        self
    }

    /// Joins the declared relation `relation`, binding the matches under its name.
    ///
    /// Undeclared relation names are ignored.
    pub fn join(mut self, relation: &str) -> Self {
        let schema = self.repository.schema();

        match schema.relations.get(relation) {
            Some(descriptor) => {
                let (local, foreign) = descriptor.keys(M::NAME);
                self.pipeline.lookup(Lookup {
                    from: descriptor.related().source(),
                    local_field: local,
                    foreign_field: foreign,
                    as_field: relation.to_string(),
                });
            }
            None => log::debug!("{} declares no relation {relation}, join skipped", M::NAME),
        }

        self
    }

    /// Sorts by `field`. Replaces any earlier ordering.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.pipeline.sort(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Keeps the first `limit` documents, then skips `offset` of them. Replaces any earlier
    /// pagination at its original position.
    pub fn limit(mut self, limit: i64, offset: u64) -> Self {
        self.pipeline.paginate(limit, offset);
        self
    }

    /// Groups the output by `field`. Replaces any earlier grouping.
    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.pipeline.group(Group::ByField(field.into()));
        self
    }

    /// Paginates to the page described by `params`.
    ///
    /// Since `$limit` runs before `$skip`, the limit covers every earlier page plus this one.
    pub fn for_page(self, params: &PaginationParams) -> Self {
        let offset = params.offset();
        self.limit((offset + params.per_page) as i64, offset as u64)
    }

    /// Applies the model's scope `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UndeclaredScope`] if the model registered no such scope.
    pub fn scope(self, name: &str, args: &[Bson]) -> DocumentStoreResult<Self> {
        let schema = self.repository.schema();
        let scope = schema.scopes.get(name).cloned().ok_or_else(|| {
            DocumentStoreError::UndeclaredScope(name.to_string(), M::NAME.to_string())
        })?;

        Ok(scope(self, args))
    }

    /// The rendered filter; empty when no predicate was added.
    pub fn to_filter(&self) -> Document {
        self.predicates.to_document()
    }

    /// The rendered aggregation pipeline.
    pub fn to_pipeline(&self) -> Vec<Document> {
        self.pipeline.render(&self.predicates)
    }

    /// Runs the pipeline and materializes every output document as an entity.
    pub async fn get(&self) -> DocumentStoreResult<EntitySet<Entity<M>>> {
        self.repository.aggregate(self.to_pipeline()).await
    }

    /// Runs the pipeline and returns the raw output documents.
    pub async fn get_raw(&self) -> DocumentStoreResult<EntitySet<Document>> {
        self.repository.aggregate_raw(self.to_pipeline()).await
    }

    /// The first document matching the filter. Pipeline stages are ignored.
    pub async fn first(&self) -> DocumentStoreResult<Option<Entity<M>>> {
        self.repository.find_first(self.to_filter()).await
    }

    /// Counts the documents matching the filter. Pipeline stages are ignored.
    pub async fn count(&self) -> DocumentStoreResult<u64> {
        self.repository.collection().count(self.to_filter()).await
    }

    pub async fn max(&self, field: &str) -> DocumentStoreResult<Option<Bson>> {
        self.accumulate(Accumulator::Max, field).await
    }

    pub async fn min(&self, field: &str) -> DocumentStoreResult<Option<Bson>> {
        self.accumulate(Accumulator::Min, field).await
    }

    pub async fn avg(&self, field: &str) -> DocumentStoreResult<Option<Bson>> {
        self.accumulate(Accumulator::Avg, field).await
    }

    pub async fn sum(&self, field: &str) -> DocumentStoreResult<Option<Bson>> {
        self.accumulate(Accumulator::Sum, field).await
    }

    /// Replaces the grouping with a single accumulation and unwraps its value.
    ///
    /// Returns `None` when nothing matched.
    async fn accumulate(&self, accumulator: Accumulator, field: &str) -> DocumentStoreResult<Option<Bson>> {
        let mut pipeline = self.pipeline.clone();
        pipeline.group(Group::Accumulate(accumulator, field.to_string()));

        let results = self
            .repository
            .collection()
            .aggregate(pipeline.render(&self.predicates))
            .await?;

        Ok(results
            .into_iter()
            .next()
            .and_then(|mut result| result.remove(AGGREGATE_FIELD))
            .filter(|result| *result != Bson::Null))
    }

    /// Adds `delta` to `field` on every matching document. No hooks fire.
    pub async fn increment(&self, field: &str, delta: impl Into<Bson>) -> DocumentStoreResult<UpdateOutcome> {
        let mut inc = Document::new();
        inc.insert(field, delta.into());

        self.repository
            .collection()
            .update_many(self.to_filter(), doc! { "$inc": inc })
            .await
    }

    pub async fn decrement(&self, field: &str, delta: impl Into<Bson>) -> DocumentStoreResult<UpdateOutcome> {
        let delta = delta.into();
        let negated = value::negate(&delta).ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("cannot decrement {field} by {delta}"))
        })?;

        self.increment(field, negated).await
    }

    /// Sets `attributes` on every matching document. No hooks fire.
    pub async fn update(&self, attributes: Document) -> DocumentStoreResult<UpdateOutcome> {
        let set: Document = attributes
            .into_iter()
            .map(|(field, value)| {
                let value = self.cast(&field, value);
                (field, value)
            })
            .collect();

        self.repository
            .collection()
            .update_many(self.to_filter(), doc! { "$set": set })
            .await
    }

    /// Removes `field` from every matching document. No hooks fire.
    pub async fn unset_field(&self, field: &str) -> DocumentStoreResult<UpdateOutcome> {
        let mut unset = Document::new();
        unset.insert(field, "");

        self.repository
            .collection()
            .update_many(self.to_filter(), doc! { "$unset": unset })
            .await
    }

    /// Deletes every matching document and returns the number deleted. No hooks fire.
    pub async fn delete(&self) -> DocumentStoreResult<u64> {
        self.repository
            .collection()
            .delete_many(self.to_filter())
            .await
    }

    /// Fetches one page along with the total match count.
    pub async fn paginate(&self, params: &PaginationParams) -> DocumentStoreResult<Page<Entity<M>>> {
        let count = self.count().await? as usize;
        let items: Vec<Entity<M>> = self
            .clone()
            .for_page(params)
            .get()
            .await?
            .into_iter()
            .collect();
        let end = params.offset() + items.len();

        Ok(Page::builder(items)
            .with_count(count)
            .with_next_page((end < count).then_some(params.page + 1))
            .with_previous_page((params.page > 1).then(|| params.page - 1))
            .build())
    }
}

impl<M: Model> Clone for QueryBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            predicates: self.predicates.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for QueryBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("model", &M::NAME)
            .field("filter", &self.to_filter())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
