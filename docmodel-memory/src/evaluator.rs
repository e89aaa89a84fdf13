//! Filter evaluation for in-memory documents.
//!
//! Filter documents are first parsed back into an [`Expr`] tree, then walked by
//! [`DocumentEvaluator`] against one stored document at a time.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docmodel_core::{
    query::{Expr, FieldOp, QueryVisitor},
    error::{DocumentStoreError, DocumentStoreResult},
    value,
};


/// Type-erased, comparable representation of BSON values.
///
/// Numbers of every width are normalized to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Orders any two values, falling back to the type rank across types.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Whether two stored values are equal under the store's comparison rules.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Equality that also matches any element when the stored value is an array.
fn matches_eq(stored: Option<&Bson>, value: &Bson) -> bool {
    match stored {
        None => matches!(value, Bson::Null),
        Some(Bson::Array(items)) if !matches!(value, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, value))
        }
        Some(stored) => values_equal(stored, value),
    }
}

/// Parses a filter document back into an expression tree.
///
/// An empty document parses to an empty conjunction, which matches everything.
pub(crate) fn parse_filter(filter: &Document) -> DocumentStoreResult<Expr> {
    let mut exprs = Vec::with_capacity(filter.len());

    for (key, condition) in filter {
        match key.as_str() {
            "$and" | "$or" => {
                let branches = condition
                    .as_array()
                    .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{key} expects an array")))?
                    .iter()
                    .map(|branch| match branch {
                        Bson::Document(branch) => parse_filter(branch),
                        other => Err(DocumentStoreError::InvalidDocument(format!(
                            "{key} branch is not a document: {other}"
                        ))),
                    })
                    .collect::<DocumentStoreResult<Vec<_>>>()?;

                exprs.push(if key == "$and" { Expr::And(branches) } else { Expr::Or(branches) });
            }
            op if op.starts_with('$') => {
                return Err(DocumentStoreError::UnknownOperator(op.to_string()));
            }
            field => exprs.extend(parse_condition(field, condition)?),
        }
    }

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => !doc.is_empty() && doc.keys().all(|key| key.starts_with('$')),
        _ => false,
    }
}

fn parse_condition(field: &str, condition: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    if !is_operator_document(condition) {
        return Ok(vec![Expr::field(field.to_string(), FieldOp::Eq, condition.clone())]);
    }

    let Bson::Document(operators) = condition else {
        return Ok(vec![]);
    };

    let mut exprs = Vec::with_capacity(operators.len());

    for (op, operand) in operators {
        let expr = match op.as_str() {
            "$eq" => Expr::field(field.to_string(), FieldOp::Eq, operand.clone()),
            "$ne" => Expr::field(field.to_string(), FieldOp::Ne, operand.clone()),
            "$gt" => Expr::field(field.to_string(), FieldOp::Gt, operand.clone()),
            "$gte" => Expr::field(field.to_string(), FieldOp::Gte, operand.clone()),
            "$lt" => Expr::field(field.to_string(), FieldOp::Lt, operand.clone()),
            "$lte" => Expr::field(field.to_string(), FieldOp::Lte, operand.clone()),
            "$regex" => {
                let pattern = match operators.get("$options") {
                    Some(options) => {
                        let mut pattern = Document::new();
                        pattern.insert("$regex", operand.clone());
                        pattern.insert("$options", options.clone());
                        Bson::Document(pattern)
                    }
                    None => operand.clone(),
                };
                Expr::field(field.to_string(), FieldOp::Matches, pattern)
            }
            "$exists" => Expr::Exists(field.to_string(), truthy(operand)),
            "$in" | "$nin" => Expr::Membership {
                field: field.to_string(),
                values: operand
                    .as_array()
                    .cloned()
                    .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{op} expects an array")))?,
                negated: op == "$nin",
            },
            "$not" => parse_negated_range(field, operand)?,
            "$options" if operators.contains_key("$regex") => continue,
            other => return Err(DocumentStoreError::UnknownOperator(other.to_string())),
        };

        exprs.push(expr);
    }

    Ok(exprs)
}

fn parse_negated_range(field: &str, operand: &Bson) -> DocumentStoreResult<Expr> {
    let range = operand
        .as_document()
        .filter(|range| range.len() == 2)
        .and_then(|range| Some((range.get("$gte")?, range.get("$lte")?)));

    match range {
        Some((low, high)) => Ok(Expr::Range {
            field: field.to_string(),
            low: low.clone(),
            high: high.clone(),
            negated: true,
        }),
        None => Err(DocumentStoreError::UnknownOperator(format!("$not {operand}"))),
    }
}

fn truthy(value: &Bson) -> bool {
    !matches!(value, Bson::Boolean(false) | Bson::Null | Bson::Int32(0) | Bson::Int64(0))
}

/// Builds a regex from a `$regex` operand, applying any `$options` flags.
fn compile_pattern(pattern: &Bson) -> DocumentStoreResult<Regex> {
    match pattern {
        Bson::String(pattern) => build_regex(pattern, ""),
        Bson::RegularExpression(regex) => build_regex(regex.pattern.as_str(), regex.options.as_str()),
        Bson::Document(spec) => {
            let source = spec
                .get_str("$regex")
                .map_err(|_| DocumentStoreError::InvalidDocument(format!("$regex expects a pattern, got {spec}")))?;
            let options = spec
                .get_str("$options")
                .map_err(|_| DocumentStoreError::InvalidDocument(format!("$options expects a string, got {spec}")))?;

            build_regex(source, options)
        }
        other => Err(DocumentStoreError::InvalidDocument(format!("$regex expects a pattern, got {other}"))),
    }
}

fn build_regex(source: &str, options: &str) -> DocumentStoreResult<Regex> {
    let mut builder = RegexBuilder::new(source);

    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "unsupported $regex option '{other}'"
                )));
            }
        };
    }

    builder
        .build()
        .map_err(|err| DocumentStoreError::InvalidDocument(err.to_string()))
}


pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    fn compare(&self, field: &str, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
        let wanted = Comparable::from(value);
        let compare_one = |stored: &Bson| {
            Comparable::from(stored)
                .partial_cmp(&wanted)
                .is_some_and(&accept)
        };

        match value::lookup(self.document, field) {
            Some(Bson::Array(items)) => items.iter().any(compare_one),
            Some(stored) => compare_one(stored),
            None => false,
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(value::lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let stored = value::lookup(self.document, field);

        Ok(match op {
            FieldOp::Eq => matches_eq(stored, value),
            FieldOp::Ne => !matches_eq(stored, value),
            FieldOp::Gt => self.compare(field, value, |ordering| ordering == Ordering::Greater),
            FieldOp::Gte => self.compare(field, value, |ordering| ordering != Ordering::Less),
            FieldOp::Lt => self.compare(field, value, |ordering| ordering == Ordering::Less),
            FieldOp::Lte => self.compare(field, value, |ordering| ordering != Ordering::Greater),
            FieldOp::Matches => {
                let regex = compile_pattern(value)?;

                match stored {
                    Some(Bson::String(text)) => regex.is_match(text),
                    Some(Bson::Array(items)) => items
                        .iter()
                        .any(|item| item.as_str().is_some_and(|text| regex.is_match(text))),
                    _ => false,
                }
            }
        })
    }

    fn visit_range(
        &mut self,
        field: &str,
        low: &Bson,
        high: &Bson,
        negated: bool,
    ) -> Result<Self::Output, Self::Error> {
        let within = match value::lookup(self.document, field) {
            Some(stored) => {
                let stored = Comparable::from(stored);
                matches!(stored.partial_cmp(&Comparable::from(low)), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(stored.partial_cmp(&Comparable::from(high)), Some(Ordering::Less | Ordering::Equal))
            }
            None => false,
        };

        Ok(within != negated)
    }

    fn visit_membership(
        &mut self,
        field: &str,
        values: &[Bson],
        negated: bool,
    ) -> Result<Self::Output, Self::Error> {
        let stored = value::lookup(self.document, field);
        let member = values.iter().any(|value| matches_eq(stored, value));

        Ok(member != negated)
    }
}

/// Whether `document` matches `filter`.
pub(crate) fn matches(document: &Document, filter: &Expr) -> DocumentStoreResult<bool> {
    DocumentEvaluator::new(document).evaluate(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn check(document: &Document, filter: Document) -> bool {
        let expr = parse_filter(&filter).unwrap();
        matches(document, &expr).unwrap()
    }

    #[test]
    fn implicit_equality_and_operators() {
        let post = doc! { "title": "Rust", "views": 12, "tags": ["a", "b"] };

        assert!(check(&post, doc! { "title": "Rust" }));
        assert!(check(&post, doc! { "views": { "$gt": 10, "$lte": 12 } }));
        assert!(!check(&post, doc! { "views": { "$lt": 12 } }));
        assert!(check(&post, doc! { "tags": "b" }));
        assert!(check(&post, doc! {}));
    }

    #[test]
    fn logical_combinators() {
        let post = doc! { "a": 1, "b": 2 };

        assert!(check(&post, doc! { "$or": [{ "a": 5 }, { "b": 2 }] }));
        assert!(!check(&post, doc! { "$and": [{ "a": 1 }, { "b": 3 }] }));
    }

    #[test]
    fn membership_range_and_existence() {
        let post = doc! { "views": 7, "author": { "name": "Ada" } };

        assert!(check(&post, doc! { "views": { "$in": [1, 7] } }));
        assert!(check(&post, doc! { "views": { "$nin": [1, 2] } }));
        assert!(check(&post, doc! { "views": { "$not": { "$gte": 10, "$lte": 20 } } }));
        assert!(check(&post, doc! { "author.name": { "$exists": true } }));
        assert!(check(&post, doc! { "missing": { "$exists": false } }));
        assert!(check(&post, doc! { "missing": Bson::Null }));
    }

    #[test]
    fn regex_and_identifiers() {
        let id = ObjectId::new();
        let post = doc! { "_id": id, "title": "Hello World" };

        assert!(check(&post, doc! { "title": { "$regex": "^Hello" } }));
        assert!(!check(&post, doc! { "title": { "$regex": "^World" } }));
        assert!(check(&post, doc! { "_id": id }));
    }

    #[test]
    fn regex_options_set_matching_flags() {
        let post = doc! { "title": "Hello\nWorld" };

        assert!(!check(&post, doc! { "title": { "$regex": "^hello" } }));
        assert!(check(&post, doc! { "title": { "$regex": "^hello", "$options": "i" } }));
        assert!(check(&post, doc! { "title": { "$regex": "^World$", "$options": "m" } }));
        assert!(check(&post, doc! { "title": { "$regex": "o.W", "$options": "s" } }));
        assert!(check(&post, doc! { "title": { "$regex": "H e l l o", "$options": "x" } }));
    }

    #[test]
    fn unsupported_regex_option_is_rejected() {
        let post = doc! { "title": "Hello" };
        let expr = parse_filter(&doc! { "title": { "$regex": "^H", "$options": "u" } }).unwrap();

        let err = matches(&post, &expr).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(message) if message.contains("'u'")));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = parse_filter(&doc! { "a": { "$near": 1 } }).unwrap_err();
        assert!(matches!(err, DocumentStoreError::UnknownOperator(op) if op == "$near"));
    }

    #[test]
    fn cross_type_ordering_is_total() {
        let null = Bson::Null;
        let number = Bson::Int32(1);
        let text = Bson::String("a".into());

        assert_eq!(Comparable::from(&null).total_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&text).total_cmp(&Comparable::from(&number)), Ordering::Greater);
    }
}
