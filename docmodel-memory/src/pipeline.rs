//! Aggregation pipeline interpreter.
//!
//! Supports the stages the mapping layer renders (`$match`, `$project`, `$lookup`, `$sort`,
//! `$limit`, `$skip`, `$group`) plus `$count`.

use std::cmp::Ordering;
use bson::{Bson, Document};

use docmodel_core::{
    ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    value,
};

use crate::{
    evaluator::{self, Comparable, values_equal},
    update::set_path,
};

/// Resolves the documents of a foreign collection for `$lookup`.
pub(crate) trait CollectionSource {
    fn documents(&self, collection: &str) -> &[Document];
}

pub(crate) struct PipelineRunner<'a, S: CollectionSource> {
    source: &'a S,
}

impl<'a, S: CollectionSource> PipelineRunner<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn run(&self, mut documents: Vec<Document>, pipeline: &[Document]) -> DocumentStoreResult<Vec<Document>> {
        for stage in pipeline {
            let (name, spec) = match stage.iter().next() {
                Some(entry) if stage.len() == 1 => entry,
                _ => {
                    return Err(DocumentStoreError::InvalidDocument(format!(
                        "pipeline stage must have exactly one key: {stage}"
                    )));
                }
            };

            documents = match name.as_str() {
                "$match" => {
                    let filter = evaluator::parse_filter(as_document(name, spec)?)?;
                    let mut matched = Vec::with_capacity(documents.len());
                    for document in documents {
                        if evaluator::matches(&document, &filter)? {
                            matched.push(document);
                        }
                    }
                    matched
                }
                "$project" => project(documents, as_document(name, spec)?)?,
                "$lookup" => self.lookup(documents, as_document(name, spec)?)?,
                "$sort" => {
                    sort_documents(&mut documents, as_document(name, spec)?);
                    documents
                }
                "$limit" => {
                    documents.truncate(as_count(name, spec)?);
                    documents
                }
                "$skip" => documents.into_iter().skip(as_count(name, spec)?).collect(),
                "$group" => group(documents, as_document(name, spec)?)?,
                "$count" => {
                    let field = spec.as_str().ok_or_else(|| {
                        DocumentStoreError::InvalidDocument("$count expects a field name".to_string())
                    })?;
                    let mut counted = Document::new();
                    counted.insert(field, documents.len() as i64);
                    vec![counted]
                }
                other => return Err(DocumentStoreError::UnknownOperator(other.to_string())),
            };
        }

        Ok(documents)
    }

    fn lookup(&self, documents: Vec<Document>, spec: &Document) -> DocumentStoreResult<Vec<Document>> {
        let from = required_str(spec, "from")?;
        let local_field = required_str(spec, "localField")?;
        let foreign_field = required_str(spec, "foreignField")?;
        let as_field = required_str(spec, "as")?;
        let foreign = self.source.documents(from);

        Ok(documents
            .into_iter()
            .map(|mut document| {
                let local = value::lookup(&document, local_field).cloned().unwrap_or(Bson::Null);
                let joined: Vec<Bson> = foreign
                    .iter()
                    .filter(|candidate| {
                        let remote = value::lookup(candidate, foreign_field).unwrap_or(&Bson::Null);
                        keys_meet(&local, remote)
                    })
                    .cloned()
                    .map(Bson::Document)
                    .collect();

                document.insert(as_field, joined);
                document
            })
            .collect())
    }
}

/// Join key equality, where either side may be an array of candidate keys.
fn keys_meet(local: &Bson, remote: &Bson) -> bool {
    match (local, remote) {
        (Bson::Array(locals), remote) => locals.iter().any(|local| keys_meet(local, remote)),
        (local, Bson::Array(remotes)) => remotes.iter().any(|remote| values_equal(local, remote)),
        (local, remote) => values_equal(local, remote),
    }
}

fn as_document<'s>(stage: &str, spec: &'s Bson) -> DocumentStoreResult<&'s Document> {
    spec.as_document()
        .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("{stage} expects a document")))
}

fn as_count(stage: &str, spec: &Bson) -> DocumentStoreResult<usize> {
    let count = match spec {
        Bson::Int32(n) => *n as i64,
        Bson::Int64(n) => *n,
        Bson::Double(n) => *n as i64,
        _ => -1,
    };

    usize::try_from(count)
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("{stage} expects a non-negative integer")))
}

fn required_str<'s>(spec: &'s Document, key: &str) -> DocumentStoreResult<&'s str> {
    spec.get_str(key)
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("$lookup requires {key}")))
}

fn is_enabled(flag: &Bson) -> bool {
    !matches!(flag, Bson::Boolean(false) | Bson::Int32(0) | Bson::Int64(0))
}

fn project(documents: Vec<Document>, spec: &Document) -> DocumentStoreResult<Vec<Document>> {
    let inclusive = spec
        .iter()
        .any(|(field, flag)| field != ID_FIELD && is_enabled(flag));
    let keep_id = spec.get(ID_FIELD).is_none_or(is_enabled);

    documents
        .into_iter()
        .map(|document| {
            if !inclusive {
                let mut kept = document;
                for (field, _) in spec {
                    if field != ID_FIELD || !keep_id {
                        kept.remove(field);
                    }
                }
                return Ok(kept);
            }

            let mut projected = Document::new();
            if keep_id {
                if let Some(id) = document.get(ID_FIELD) {
                    projected.insert(ID_FIELD, id.clone());
                }
            }
            for (field, flag) in spec {
                if field == ID_FIELD || !is_enabled(flag) {
                    continue;
                }
                if let Some(found) = value::lookup(&document, field) {
                    set_path(&mut projected, field, found.clone())?;
                }
            }
            Ok(projected)
        })
        .collect()
}

/// Stable multi-key sort; `spec` maps fields to `1` or `-1`.
fn sort_documents(documents: &mut [Document], spec: &Document) {
    documents.sort_by(|a, b| {
        for (field, direction) in spec {
            let left = value::lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
            let right = value::lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);
            let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                || matches!(direction, Bson::Int64(d) if *d < 0);

            let ordering = if descending {
                right.total_cmp(&left)
            } else {
                left.total_cmp(&right)
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

/// Evaluates a group expression: `"$field"` reads the field, anything else is a literal.
fn resolve(document: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => value::lookup(document, &path[1..])
            .cloned()
            .unwrap_or(Bson::Null),
        literal => literal.clone(),
    }
}

fn group(documents: Vec<Document>, spec: &Document) -> DocumentStoreResult<Vec<Document>> {
    let key_expr = spec.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();

    for document in documents {
        let key = resolve(&document, &key_expr);
        match groups.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
            Some((_, members)) => members.push(document),
            None => groups.push((key, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut output = Document::new();
            output.insert(ID_FIELD, key);

            for (field, accumulator) in spec {
                if field == ID_FIELD {
                    continue;
                }
                output.insert(field, accumulate(field, accumulator, &members)?);
            }

            Ok(output)
        })
        .collect()
}

fn accumulate(field: &str, accumulator: &Bson, members: &[Document]) -> DocumentStoreResult<Bson> {
    let (op, expr) = accumulator
        .as_document()
        .filter(|spec| spec.len() == 1)
        .and_then(|spec| spec.iter().next())
        .ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("{field} must hold one accumulator"))
        })?;

    let mut items = members.iter().map(|member| resolve(member, expr));

    Ok(match op.as_str() {
        "$sum" => items
            .filter(|item| value::as_f64(item).is_some())
            .try_fold(Bson::Int32(0), |total, item| value::add(&total, &item))
            .unwrap_or(Bson::Null),
        "$avg" => {
            let numbers: Vec<f64> = items.filter_map(|item| value::as_f64(&item)).collect();
            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "$min" | "$max" => {
            let wanted = if op == "$min" { Ordering::Less } else { Ordering::Greater };
            items
                .filter(|item| *item != Bson::Null)
                .reduce(|best, item| {
                    if Comparable::from(&item).total_cmp(&Comparable::from(&best)) == wanted {
                        item
                    } else {
                        best
                    }
                })
                .unwrap_or(Bson::Null)
        }
        "$first" => items.next().unwrap_or(Bson::Null),
        "$last" => items.last().unwrap_or(Bson::Null),
        "$push" => Bson::Array(items.collect()),
        other => return Err(DocumentStoreError::UnknownOperator(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::collections::HashMap;

    struct Collections(HashMap<String, Vec<Document>>);

    impl CollectionSource for Collections {
        fn documents(&self, collection: &str) -> &[Document] {
            self.0.get(collection).map(Vec::as_slice).unwrap_or(&[])
        }
    }

    fn posts() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "title": "a", "views": 5, "author": "x" },
            doc! { "_id": 2, "title": "b", "views": 20, "author": "y" },
            doc! { "_id": 3, "title": "c", "views": 12, "author": "x" },
        ]
    }

    fn run(pipeline: Vec<Document>) -> Vec<Document> {
        let source = Collections(HashMap::from([(
            "comment".to_string(),
            vec![
                doc! { "_id": 10, "post_id": 1 },
                doc! { "_id": 11, "post_id": 1 },
                doc! { "_id": 12, "post_id": 3 },
            ],
        )]));

        PipelineRunner::new(&source).run(posts(), &pipeline).unwrap()
    }

    #[test]
    fn match_sort_limit_skip() {
        let output = run(vec![
            doc! { "$match": { "views": { "$gt": 1 } } },
            doc! { "$sort": { "views": -1 } },
            doc! { "$limit": 2_i64 },
            doc! { "$skip": 1_i64 },
        ]);

        assert_eq!(output, vec![doc! { "_id": 3, "title": "c", "views": 12, "author": "x" }]);
    }

    #[test]
    fn project_keeps_identity() {
        let output = run(vec![doc! { "$project": { "title": 1 } }]);

        assert_eq!(output[0], doc! { "_id": 1, "title": "a" });
    }

    #[test]
    fn lookup_binds_matches() {
        let output = run(vec![doc! {
            "$lookup": { "from": "comment", "localField": "_id", "foreignField": "post_id", "as": "comments" }
        }]);

        assert_eq!(output[0].get_array("comments").unwrap().len(), 2);
        assert_eq!(output[1].get_array("comments").unwrap().len(), 0);
        assert_eq!(output[2].get_array("comments").unwrap().len(), 1);
    }

    #[test]
    fn group_accumulators() {
        let output = run(vec![doc! { "$group": { "_id": Bson::Null, "result": { "$max": "$views" } } }]);
        assert_eq!(output, vec![doc! { "_id": Bson::Null, "result": 20 }]);

        let output = run(vec![doc! { "$group": { "_id": Bson::Null, "result": { "$sum": "$views" } } }]);
        assert_eq!(output[0].get("result"), Some(&Bson::Int32(37)));

        let output = run(vec![doc! { "$group": { "_id": "$author" } }]);
        assert_eq!(output, vec![doc! { "_id": "x" }, doc! { "_id": "y" }]);
    }

    #[test]
    fn group_on_empty_input_yields_nothing() {
        let output = run(vec![
            doc! { "$match": { "views": { "$gt": 100 } } },
            doc! { "$group": { "_id": Bson::Null, "result": { "$avg": "$views" } } },
        ]);

        assert!(output.is_empty());
    }
}
