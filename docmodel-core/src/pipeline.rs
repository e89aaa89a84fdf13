//! Aggregation pipeline stages and their rendering order.
//!
//! A [`Pipeline`] keeps its stages in call order behind the filter's `$match`. Sort, pagination
//! and grouping replace their earlier stage in place; projections merge into one stage; joins
//! append. Order matters: a `$sort` added after a `$group` sorts the groups.

use bson::{Bson, Document, doc};
use std::str::FromStr;

use crate::{
    ID_FIELD,
    error::DocumentStoreError,
    query::{Filter, Predicates},
};

/// Name of the field scalar aggregates accumulate into.
pub const AGGREGATE_FIELD: &str = "result";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

impl FromStr for SortDirection {
    type Err = DocumentStoreError;

    /// Anything other than `asc` sorts descending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        })
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn to_document(&self) -> Document {
        let mut sort = Document::new();
        sort.insert(self.field.clone(), self.direction.as_i32());
        sort
    }
}

/// A join against another collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

/// Accumulator operators usable as scalar aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Max,
    Min,
    Avg,
    Sum,
}

impl Accumulator {
    pub fn token(&self) -> &'static str {
        match self {
            Accumulator::Max => "$max",
            Accumulator::Min => "$min",
            Accumulator::Avg => "$avg",
            Accumulator::Sum => "$sum",
        }
    }
}

/// The single active grouping of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Group {
    /// Groups documents by the value of a field.
    ByField(String),
    /// Collapses every document into one group holding a single accumulated value.
    Accumulate(Accumulator, String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Project(Vec<String>),
    Lookup(Lookup),
    Sort(Sort),
    Limit(i64),
    Skip(u64),
    Group(Group),
}

impl Stage {
    /// Renders the stage as a single-key document.
    pub fn to_document(&self) -> Document {
        match self {
            Stage::Match(filter) => doc! { "$match": filter.clone() },
            Stage::Project(fields) => doc! {
                "$project": fields
                    .iter()
                    .map(|field| (field.clone(), Bson::Int32(1)))
                    .collect::<Document>(),
            },
            Stage::Lookup(lookup) => doc! {
                "$lookup": {
                    "from": lookup.from.clone(),
                    "localField": lookup.local_field.clone(),
                    "foreignField": lookup.foreign_field.clone(),
                    "as": lookup.as_field.clone(),
                },
            },
            Stage::Sort(sort) => doc! { "$sort": sort.to_document() },
            Stage::Limit(limit) => doc! { "$limit": *limit },
            Stage::Skip(skip) => doc! { "$skip": *skip as i64 },
            Stage::Group(Group::ByField(field)) => doc! {
                "$group": { ID_FIELD: format!("${field}") },
            },
            Stage::Group(Group::Accumulate(accumulator, field)) => {
                let mut accumulate = Document::new();
                accumulate.insert(accumulator.token(), format!("${field}"));

                let mut group = doc! { ID_FIELD: Bson::Null };
                group.insert(AGGREGATE_FIELD, accumulate);

                doc! { "$group": group }
            }
        }
    }
}

/// Stage directives of one fluent chain, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Adds fields to the projection, keeping the first occurrence of each.
    pub fn project<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let position = self
            .stages
            .iter()
            .position(|stage| matches!(stage, Stage::Project(_)));
        let index = position.unwrap_or_else(|| {
            self.stages.push(Stage::Project(Vec::new()));
            self.stages.len() - 1
        });

        if let Stage::Project(projection) = &mut self.stages[index] {
            for field in fields {
                let field = field.into();

                if !projection.contains(&field) {
                    projection.push(field);
                }
            }
        }
    }

    pub fn lookup(&mut self, lookup: Lookup) {
        self.stages.push(Stage::Lookup(lookup));
    }

    pub fn sort(&mut self, sort: Sort) {
        self.replace(Stage::Sort(sort), |stage| matches!(stage, Stage::Sort(_)));
    }

    /// Keeps the first `limit` documents, then skips `offset` of them when `offset > 0`.
    ///
    /// Replaces earlier pagination at its original position.
    pub fn paginate(&mut self, limit: i64, offset: u64) {
        let position = self
            .stages
            .iter()
            .position(|stage| matches!(stage, Stage::Limit(_) | Stage::Skip(_)))
            .unwrap_or(self.stages.len());
        self.stages
            .retain(|stage| !matches!(stage, Stage::Limit(_) | Stage::Skip(_)));

        let mut page = vec![Stage::Limit(limit)];
        if offset > 0 {
            page.push(Stage::Skip(offset));
        }
        let position = position.min(self.stages.len());
        self.stages.splice(position..position, page);
    }

    pub fn group(&mut self, group: Group) {
        self.replace(Stage::Group(group), |stage| matches!(stage, Stage::Group(_)));
    }

    fn replace(&mut self, stage: Stage, same_kind: impl Fn(&Stage) -> bool) {
        match self.stages.iter().position(same_kind) {
            Some(index) => self.stages[index] = stage,
            None => self.stages.push(stage),
        }
    }

    /// Returns the ordered stages for `filter`.
    ///
    /// An empty filter renders the sentinel `_id exists` match.
    pub fn stages(&self, filter: &Predicates) -> Vec<Stage> {
        let mut stages = vec![Stage::Match(if filter.is_empty() {
            Filter::exists(ID_FIELD).to_document()
        } else {
            filter.to_document()
        })];
        stages.extend(self.stages.iter().cloned());

        stages
    }

    pub fn render(&self, filter: &Predicates) -> Vec<Document> {
        self.stages(filter)
            .iter()
            .map(Stage::to_document)
            .collect()
    }
}
