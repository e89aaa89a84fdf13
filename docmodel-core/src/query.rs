//! Filter expression trees and their rendering into store filter documents.
//!
//! This module holds the pure half of query construction: the [`Expr`] tree, the [`Filter`]
//! constructors for its leaves, the [`Predicates`] accumulator that applies the implicit
//! `and` / explicit `or` combinator rule, and the [`QueryVisitor`] used to walk a tree.
//!
//! # Combinator rule
//!
//! The first predicate becomes the root. Each later predicate either appends to the root's
//! list (when the root is already a list under the same combinator) or wraps the whole root
//! together with the new node under the call's combinator:
//!
//! ```ignore
//! use docmodel::query::{Combinator, Filter, Predicates};
//!
//! let mut predicates = Predicates::default();
//! predicates.push(Combinator::And, Filter::eq("a", 1));
//! predicates.push(Combinator::Or, Filter::eq("b", 2));
//! predicates.push(Combinator::And, Filter::eq("c", 3));
//! // {"$and": [{"$or": [{a: {$eq: 1}}, {b: {$eq: 2}}]}, {c: {$eq: 3}}]}
//! ```

use bson::{Bson, Document, doc};
use std::{convert::Infallible, fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field comparison operators for filter leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `matches`, a pattern match performed by the store.
    Matches,
}

impl FieldOp {
    /// Returns the store-native operator token.
    pub fn token(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::Matches => "$regex",
        }
    }
}

impl FromStr for FieldOp {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(FieldOp::Eq),
            "!=" => Ok(FieldOp::Ne),
            ">" => Ok(FieldOp::Gt),
            ">=" => Ok(FieldOp::Gte),
            "<" => Ok(FieldOp::Lt),
            "<=" => Ok(FieldOp::Lte),
            "matches" => Ok(FieldOp::Matches),
            other => Err(DocumentStoreError::UnknownOperator(other.to_string())),
        }
    }
}

impl TryFrom<&str> for FieldOp {
    type Error = DocumentStoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldOp::Eq => "=",
            FieldOp::Ne => "!=",
            FieldOp::Gt => ">",
            FieldOp::Gte => ">=",
            FieldOp::Lt => "<",
            FieldOp::Lte => "<=",
            FieldOp::Matches => "matches",
        })
    }
}

/// How a new predicate joins the existing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

/// A filter expression for querying documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
    /// Inclusive range check, optionally negated.
    Range {
        field: String,
        low: Bson,
        high: Bson,
        negated: bool,
    },
    /// Set membership check, optionally negated.
    Membership {
        field: String,
        values: Vec<Bson>,
        negated: bool,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Combines under the given combinator.
    pub fn combine(self, combinator: Combinator, other: Expr) -> Self {
        match combinator {
            Combinator::And => self.and(other),
            Combinator::Or => self.or(other),
        }
    }

    /// Renders this expression into a store filter document.
    pub fn to_document(&self) -> Document {
        match FilterRenderer.visit_expr(self) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }
}

/// Helper struct for constructing filter leaves.
///
/// ```ignore
/// use docmodel::query::Filter;
///
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    pub fn compare(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), op, value.into())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Lte, value)
    }

    /// Pattern match, rendered as `$regex`.
    pub fn matches(field: impl Into<String>, pattern: impl Into<Bson>) -> Expr {
        Self::compare(field, FieldOp::Matches, pattern)
    }

    /// Matches documents where `low <= field <= high`.
    pub fn between(field: impl Into<String>, low: impl Into<Bson>, high: impl Into<Bson>) -> Expr {
        Expr::Range {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    /// Matches documents where the field lies outside `[low, high]`.
    pub fn not_between(
        field: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Expr {
        Expr::Range {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: true,
        }
    }

    pub fn any_of<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Expr {
        Expr::Membership {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn none_of<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Expr {
        Expr::Membership {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

/// Accumulates predicates into a single tree following the combinator rule.
///
/// An empty accumulator matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicates {
    root: Option<Expr>,
}

impl Predicates {
    pub fn push(&mut self, combinator: Combinator, expr: Expr) {
        self.root = Some(match self.root.take() {
            None => expr,
            Some(root) => root.combine(combinator, expr),
        });
    }

    /// Inserts another accumulator's tree as a single node. Empty groups are ignored.
    pub fn push_group(&mut self, combinator: Combinator, group: Predicates) {
        if let Some(expr) = group.root {
            self.push(combinator, expr);
        }
    }

    pub fn root(&self) -> Option<&Expr> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Renders the tree, or an empty document when no predicate was added.
    pub fn to_document(&self) -> Document {
        self.root
            .as_ref()
            .map(Expr::to_document)
            .unwrap_or_default()
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_range(
        &mut self,
        field: &str,
        low: &Bson,
        high: &Bson,
        negated: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_membership(
        &mut self,
        field: &str,
        values: &[Bson],
        negated: bool,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
            Expr::Range { field, low, high, negated } => {
                self.visit_range(field, low, high, *negated)
            }
            Expr::Membership { field, values, negated } => {
                self.visit_membership(field, values, *negated)
            }
        }
    }
}

/// Translates expression trees into the store's filter document syntax.
pub struct FilterRenderer;

impl QueryVisitor for FilterRenderer {
    type Output = Document;
    type Error = Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let mut condition = Document::new();
        condition.insert(op.token(), value.clone());

        Ok(doc! { field: condition })
    }

    fn visit_range(
        &mut self,
        field: &str,
        low: &Bson,
        high: &Bson,
        negated: bool,
    ) -> Result<Self::Output, Self::Error> {
        let range = doc! { "$gte": low.clone(), "$lte": high.clone() };

        Ok(if negated {
            doc! { field: { "$not": range } }
        } else {
            doc! { field: range }
        })
    }

    fn visit_membership(
        &mut self,
        field: &str,
        values: &[Bson],
        negated: bool,
    ) -> Result<Self::Output, Self::Error> {
        let token = if negated { "$nin" } else { "$in" };
        let mut condition = Document::new();
        condition.insert(token, values.to_vec());

        Ok(doc! { field: condition })
    }
}

/// Parses an operator token, for callers holding operators as strings.
pub fn parse_op(token: &str) -> DocumentStoreResult<FieldOp> {
    token.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn where_where_renders_conjunction() {
        let mut predicates = Predicates::default();
        predicates.push(Combinator::And, Filter::eq("a", 1));
        predicates.push(Combinator::And, Filter::eq("b", 2));

        assert_eq!(
            predicates.to_document(),
            doc! { "$and": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] }
        );
    }

    #[test]
    fn where_or_where_renders_disjunction() {
        let mut predicates = Predicates::default();
        predicates.push(Combinator::And, Filter::eq("a", 1));
        predicates.push(Combinator::Or, Filter::eq("b", 2));

        assert_eq!(
            predicates.to_document(),
            doc! { "$or": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] }
        );
    }

    #[test]
    fn same_combinator_appends_to_existing_list() {
        let mut predicates = Predicates::default();
        predicates.push(Combinator::And, Filter::eq("a", 1));
        predicates.push(Combinator::Or, Filter::eq("b", 2));
        predicates.push(Combinator::Or, Filter::eq("c", 3));

        assert_eq!(
            predicates.to_document(),
            doc! { "$or": [
                { "a": { "$eq": 1 } },
                { "b": { "$eq": 2 } },
                { "c": { "$eq": 3 } }
            ] }
        );
    }

    #[test]
    fn switching_combinator_wraps_the_established_list() {
        let mut predicates = Predicates::default();
        predicates.push(Combinator::And, Filter::eq("a", 1));
        predicates.push(Combinator::Or, Filter::eq("b", 2));
        predicates.push(Combinator::And, Filter::eq("c", 3));

        assert_eq!(
            predicates.to_document(),
            doc! { "$and": [
                { "$or": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] },
                { "c": { "$eq": 3 } }
            ] }
        );
    }

    #[test]
    fn first_predicate_becomes_root() {
        let mut predicates = Predicates::default();
        assert_eq!(predicates.to_document(), Document::new());

        predicates.push(Combinator::Or, Filter::gt("views", 10));
        assert_eq!(predicates.to_document(), doc! { "views": { "$gt": 10 } });
    }

    #[test]
    fn ranges_and_membership_render_store_tokens() {
        assert_eq!(
            Filter::between("age", 18, 30).to_document(),
            doc! { "age": { "$gte": 18, "$lte": 30 } }
        );
        assert_eq!(
            Filter::not_between("age", 18, 30).to_document(),
            doc! { "age": { "$not": { "$gte": 18, "$lte": 30 } } }
        );
        assert_eq!(
            Filter::any_of("tag", ["a", "b"]).to_document(),
            doc! { "tag": { "$in": ["a", "b"] } }
        );
        assert_eq!(
            Filter::none_of("tag", [1, 2]).to_document(),
            doc! { "tag": { "$nin": [1, 2] } }
        );
        assert_eq!(
            Filter::matches("title", "^rust").to_document(),
            doc! { "title": { "$regex": "^rust" } }
        );
    }

    #[test]
    fn group_is_inserted_as_single_node() {
        let mut left = Predicates::default();
        left.push(Combinator::And, Filter::eq("a", 1));
        left.push(Combinator::And, Filter::eq("b", 2));

        let mut right = Predicates::default();
        right.push(Combinator::And, Filter::eq("c", 3));
        right.push(Combinator::And, Filter::eq("d", 4));

        let mut predicates = Predicates::default();
        predicates.push_group(Combinator::And, left);
        predicates.push_group(Combinator::Or, right);
        predicates.push_group(Combinator::Or, Predicates::default());

        assert_eq!(
            predicates.to_document(),
            doc! { "$or": [
                { "$and": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] },
                { "$and": [{ "c": { "$eq": 3 } }, { "d": { "$eq": 4 } }] }
            ] }
        );
    }

    #[test]
    fn operator_tokens_parse() {
        assert_eq!(">=".parse::<FieldOp>().unwrap(), FieldOp::Gte);
        assert_eq!(FieldOp::try_from("matches").unwrap(), FieldOp::Matches);
        assert!(matches!(
            parse_op("=~"),
            Err(DocumentStoreError::UnknownOperator(op)) if op == "=~"
        ));
    }
}
