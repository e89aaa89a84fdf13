//! Applies `$set`, `$unset` and `$inc` update documents in place.

use bson::{Bson, Document};

use docmodel_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{self, NodeMut},
};

/// Applies `update` to `document` and reports whether anything changed.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DocumentStoreResult<bool> {
    let before = document.clone();

    for (op, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("{op} expects a document of fields"))
        })?;

        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let current = value::lookup(document, path).cloned().unwrap_or(Bson::Null);
                    let sum = value::add(&current, delta).ok_or_else(|| {
                        DocumentStoreError::InvalidDocument(format!(
                            "cannot increment non-numeric field {path}"
                        ))
                    })?;

                    set_path(document, path, sum)?;
                }
            }
            other => return Err(DocumentStoreError::UnknownOperator(other.to_string())),
        }
    }

    Ok(*document != before)
}

/// Writes `value` at a dotted `path`, creating intermediate mappings as needed.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };

    let mut node = NodeMut::Map(document);
    for segment in parents {
        node = descend_or_create(node, segment)?;
    }

    match node {
        NodeMut::Map(doc) => {
            doc.insert(*last, value);
        }
        NodeMut::Seq(items) => {
            let index = position(last)?;
            if items.len() <= index {
                items.resize(index + 1, Bson::Null);
            }
            items[index] = value;
        }
    }

    Ok(())
}

/// Removes the value at `path`. Array positions are nulled rather than removed.
fn unset_path(document: &mut Document, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();

    if let Some((last, parents)) = segments.split_last() {
        if let Some(parent) = value::parent_mut(document, parents) {
            parent.remove(last);
        }
    }
}

fn descend_or_create<'a>(node: NodeMut<'a>, segment: &str) -> DocumentStoreResult<NodeMut<'a>> {
    let slot = match node {
        NodeMut::Map(doc) => {
            if matches!(doc.get(segment), None | Some(Bson::Null)) {
                doc.insert(segment, Document::new());
            }
            doc.get_mut(segment)
        }
        NodeMut::Seq(items) => {
            let index = position(segment)?;
            if items.len() <= index {
                items.resize(index + 1, Bson::Null);
            }
            if items[index] == Bson::Null {
                items[index] = Bson::Document(Document::new());
            }
            items.get_mut(index)
        }
    };

    match slot {
        Some(Bson::Document(doc)) => Ok(NodeMut::Map(doc)),
        Some(Bson::Array(items)) => Ok(NodeMut::Seq(items)),
        _ => Err(DocumentStoreError::InvalidDocument(format!(
            "cannot create field {segment} inside a scalar"
        ))),
    }
}

fn position(segment: &str) -> DocumentStoreResult<usize> {
    segment
        .parse()
        .map_err(|_| DocumentStoreError::InvalidDocument(format!("{segment} is not an array position")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_creates_nested_paths() {
        let mut post = doc! { "title": "a" };
        let changed = apply_update(&mut post, &doc! { "$set": { "meta.views": 3, "title": "b" } }).unwrap();

        assert!(changed);
        assert_eq!(post, doc! { "title": "b", "meta": { "views": 3 } });
    }

    #[test]
    fn unset_nulls_array_positions() {
        let mut post = doc! { "tags": ["a", "b", "c"], "x": { "y": 1 } };
        apply_update(&mut post, &doc! { "$unset": { "tags.1": "", "x.y": "" } }).unwrap();

        assert_eq!(post, doc! { "tags": ["a", Bson::Null, "c"], "x": {} });
    }

    #[test]
    fn inc_treats_missing_as_zero() {
        let mut post = doc! { "views": 2 };
        apply_update(&mut post, &doc! { "$inc": { "views": 3, "likes": 1 } }).unwrap();

        assert_eq!(post, doc! { "views": 5, "likes": 1 });
    }

    #[test]
    fn inc_rejects_strings() {
        let mut post = doc! { "title": "a" };
        assert!(apply_update(&mut post, &doc! { "$inc": { "title": 1 } }).is_err());
    }

    #[test]
    fn unchanged_update_reports_no_change() {
        let mut post = doc! { "views": 2 };
        assert!(!apply_update(&mut post, &doc! { "$set": { "views": 2 } }).unwrap());
    }
}
