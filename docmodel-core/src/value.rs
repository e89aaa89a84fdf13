//! Helpers for walking and rendering BSON values.
//!
//! Dotted paths (`address.lines.0`) address nested values: a segment names a key inside a
//! mapping node, or a zero-based position inside a sequence node. [`parent_mut`] hands out an
//! explicit mutable cursor into the tree instead of aliased references.

use bson::{Bson, DateTime, Document};
use chrono::Utc;
use serde_json::{Map, Number, Value};

/// Format used when rendering store date-times as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// A mutable cursor pointing at a container node inside a document tree.
#[derive(Debug)]
pub enum NodeMut<'a> {
    Map(&'a mut Document),
    Seq(&'a mut Vec<Bson>),
}

impl<'a> NodeMut<'a> {
    /// Descends into the container stored under `segment`.
    ///
    /// Returns `None` when the segment is absent or holds a scalar.
    pub fn child(self, segment: &str) -> Option<NodeMut<'a>> {
        let value = match self {
            NodeMut::Map(doc) => doc.get_mut(segment)?,
            NodeMut::Seq(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
        };

        match value {
            Bson::Document(doc) => Some(NodeMut::Map(doc)),
            Bson::Array(items) => Some(NodeMut::Seq(items)),
            _ => None,
        }
    }

    /// Whether `segment` holds a non-null value in this node.
    pub fn contains(&self, segment: &str) -> bool {
        let value = match self {
            NodeMut::Map(doc) => doc.get(segment),
            NodeMut::Seq(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
        };

        !matches!(value, None | Some(Bson::Null))
    }

    /// Removes `segment` from this node and reports whether anything was there.
    ///
    /// Sequence positions are nulled rather than shifted, matching the store's `$unset`.
    pub fn remove(self, segment: &str) -> bool {
        if !self.contains(segment) {
            return false;
        }

        match self {
            NodeMut::Map(doc) => doc.remove(segment).is_some(),
            NodeMut::Seq(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = Bson::Null;
                    true
                }
                None => false,
            },
        }
    }
}

/// Walks every segment of `path` and returns a cursor at the container it ends on.
pub fn parent_mut<'a>(doc: &'a mut Document, path: &[&str]) -> Option<NodeMut<'a>> {
    path.iter()
        .try_fold(NodeMut::Map(doc), |node, segment| node.child(segment))
}

/// Reads the value at a dotted `path`.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(doc) => doc.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Numeric addition with BSON widening rules.
///
/// `Null` counts as zero. Two `Int32`s stay `Int32` unless they overflow; any `Int64` widens the
/// result to `Int64`, or to `Double` when that overflows; any `Double` makes it a `Double`.
/// Returns `None` for non-numeric operands.
pub fn add(left: &Bson, right: &Bson) -> Option<Bson> {
    let zero = Bson::Int32(0);
    let left = if matches!(left, Bson::Null) { &zero } else { left };

    Some(match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        (Bson::Int32(a), Bson::Int64(b)) => add_wide(*a as i64, *b),
        (Bson::Int64(a), Bson::Int32(b)) => add_wide(*a, *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => add_wide(*a, *b),
        (a, b) => Bson::Double(as_f64(a)? + as_f64(b)?),
    })
}

fn add_wide(a: i64, b: i64) -> Bson {
    a.checked_add(b)
        .map(Bson::Int64)
        .unwrap_or(Bson::Double(a as f64 + b as f64))
}

/// Negates a numeric value. `i64::MIN` negates to a `Double`.
pub fn negate(value: &Bson) -> Option<Bson> {
    match value {
        Bson::Int32(v) => Some(
            v.checked_neg()
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(-(*v as i64))),
        ),
        Bson::Int64(v) => Some(
            v.checked_neg()
                .map(Bson::Int64)
                .unwrap_or(Bson::Double(-(*v as f64))),
        ),
        Bson::Double(v) => Some(Bson::Double(-v)),
        _ => None,
    }
}

pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Renders a value as a string usable as a map key.
///
/// Strings are used as-is, identifiers as hex, numbers in decimal and booleans as `1`/`0`.
pub fn key_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(id) => id.to_hex(),
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => v.to_string(),
        Bson::Boolean(b) => (if *b { "1" } else { "0" }).to_string(),
        Bson::Null => String::new(),
        other => to_json_value(other).to_string(),
    }
}

/// Replaces identifiers with their hex form and date-times with [`DATETIME_FORMAT`] text.
pub fn to_plain(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(id) => Bson::String(id.to_hex()),
        Bson::DateTime(dt) => Bson::String(format_datetime(dt)),
        Bson::Document(doc) => Bson::Document(
            doc.into_iter()
                .map(|(key, value)| (key, to_plain(value)))
                .collect(),
        ),
        Bson::Array(items) => Bson::Array(items.into_iter().map(to_plain).collect()),
        other => other,
    }
}

pub fn format_datetime(dt: DateTime) -> String {
    let dt: chrono::DateTime<Utc> = dt.to_chrono();
    dt.format(DATETIME_FORMAT).to_string()
}

/// Converts a BSON value into plain JSON.
pub fn to_json_value(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(v) => Value::from(*v),
        Bson::Int64(v) => Value::from(*v),
        Bson::Double(v) => Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(id) => Value::String(id.to_hex()),
        Bson::DateTime(dt) => Value::String(format_datetime(*dt)),
        Bson::Array(items) => Value::Array(items.iter().map(to_json_value).collect()),
        Bson::Document(doc) => Value::Object(
            doc.iter()
                .map(|(key, value)| (key.clone(), to_json_value(value)))
                .collect::<Map<String, Value>>(),
        ),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursor_reaches_nested_parent() {
        let mut doc = doc! { "x": { "y": { "z": 1 } } };

        let removed = parent_mut(&mut doc, &["x", "y"])
            .map(|node| node.remove("z"))
            .unwrap_or(false);

        assert!(removed);
        assert_eq!(doc, doc! { "x": { "y": {} } });
    }

    #[test]
    fn cursor_stops_at_missing_or_scalar_segment() {
        let mut doc = doc! { "x": 5 };

        assert!(parent_mut(&mut doc, &["missing"]).is_none());
        assert!(parent_mut(&mut doc, &["x"]).is_none());
    }

    #[test]
    fn sequence_positions_are_nulled() {
        let mut doc = doc! { "tags": ["a", "b", "c"] };

        let removed = parent_mut(&mut doc, &["tags"])
            .map(|node| node.remove("1"))
            .unwrap_or(false);

        assert!(removed);
        assert_eq!(doc, doc! { "tags": ["a", Bson::Null, "c"] });
        assert!(!parent_mut(&mut doc, &["tags"]).map(|node| node.remove("1")).unwrap_or(false));
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let doc = doc! { "a": { "b": [10, { "c": "deep" }] } };

        assert_eq!(lookup(&doc, "a.b.0"), Some(&Bson::Int32(10)));
        assert_eq!(lookup(&doc, "a.b.1.c"), Some(&Bson::String("deep".into())));
        assert_eq!(lookup(&doc, "a.x"), None);
    }

    #[test]
    fn plain_rendering_replaces_store_types() {
        let id = bson::oid::ObjectId::new();
        let plain = to_plain(Bson::Document(doc! {
            "id": id,
            "at": DateTime::from_millis(0),
            "nested": [{ "id": id }],
        }));

        assert_eq!(
            plain,
            Bson::Document(doc! {
                "id": id.to_hex(),
                "at": "1970-01-01T00:00:00+0000",
                "nested": [{ "id": id.to_hex() }],
            })
        );
    }

    #[test]
    fn addition_widens_operands() {
        assert_eq!(add(&Bson::Int32(2), &Bson::Int32(3)), Some(Bson::Int32(5)));
        assert_eq!(add(&Bson::Int32(i32::MAX), &Bson::Int32(1)), Some(Bson::Int64(i32::MAX as i64 + 1)));
        assert_eq!(add(&Bson::Int64(2), &Bson::Int32(3)), Some(Bson::Int64(5)));
        assert_eq!(add(&Bson::Double(0.5), &Bson::Int32(1)), Some(Bson::Double(1.5)));
        assert_eq!(add(&Bson::Null, &Bson::Int32(4)), Some(Bson::Int32(4)));
        assert_eq!(add(&Bson::String("x".into()), &Bson::Int32(1)), None);
    }

    #[test]
    fn wide_overflow_falls_back_to_double() {
        assert_eq!(
            add(&Bson::Int64(i64::MAX), &Bson::Int32(1)),
            Some(Bson::Double(i64::MAX as f64 + 1.0))
        );
        assert_eq!(
            add(&Bson::Int32(-1), &Bson::Int64(i64::MIN)),
            Some(Bson::Double(i64::MIN as f64 - 1.0))
        );
        assert_eq!(negate(&Bson::Int64(i64::MIN)), Some(Bson::Double(-(i64::MIN as f64))));
        assert_eq!(negate(&Bson::Int64(7)), Some(Bson::Int64(-7)));
    }
}
