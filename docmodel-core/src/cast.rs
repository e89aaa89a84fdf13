//! Per-field type coercion.
//!
//! A model declares a [`Casts`] table mapping attribute names to a target [`Cast`]. Every value
//! written through an entity, and every comparison value handed to a query builder, is coerced
//! through the table before it is stored or rendered. Coercion never fails: the identifier cast
//! yields `Null` for text that is not a valid identifier.

use bson::{Bson, Document, oid::ObjectId};
use indexmap::IndexMap;

/// Target representation of a cast attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    Integer,
    Float,
    Boolean,
    String,
    /// A generic sequence.
    Array,
    /// A generic mapping.
    Object,
    /// A store identifier.
    Id,
}

impl Cast {
    pub fn apply(&self, value: Bson) -> Bson {
        match self {
            Cast::Integer => Bson::Int64(to_integer(&value)),
            Cast::Float => Bson::Double(to_float(&value)),
            Cast::Boolean => Bson::Boolean(truthy(&value)),
            Cast::String => to_string(value),
            Cast::Array => match value {
                Bson::Array(items) => Bson::Array(items),
                Bson::Document(doc) => Bson::Array(doc.into_iter().map(|(_, v)| v).collect()),
                Bson::Null => Bson::Array(Vec::new()),
                scalar => Bson::Array(vec![scalar]),
            },
            Cast::Object => match value {
                Bson::Document(doc) => Bson::Document(doc),
                Bson::Array(items) => Bson::Document(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(index, v)| (index.to_string(), v))
                        .collect(),
                ),
                Bson::Null => Bson::Document(Document::new()),
                scalar => {
                    let mut doc = Document::new();
                    doc.insert("scalar", scalar);
                    Bson::Document(doc)
                }
            },
            Cast::Id => match value {
                Bson::ObjectId(id) => Bson::ObjectId(id),
                Bson::String(hex) => ObjectId::parse_str(&hex)
                    .map(Bson::ObjectId)
                    .unwrap_or(Bson::Null),
                _ => Bson::Null,
            },
        }
    }
}

/// Ordered table of attribute casts for one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Casts {
    rules: IndexMap<String, Cast>,
}

impl Casts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `field` as cast to `cast`, replacing any earlier rule.
    pub fn cast(mut self, field: impl Into<String>, cast: Cast) -> Self {
        self.rules.insert(field.into(), cast);
        self
    }

    pub fn get(&self, field: &str) -> Option<Cast> {
        self.rules.get(field).copied()
    }

    /// Coerces `value` through the rule declared for `field`, or returns it unchanged.
    pub fn apply(&self, field: &str, value: Bson) -> Bson {
        match self.get(field) {
            Some(cast) => cast.apply(value),
            None => value,
        }
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(b) => *b,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        Bson::String(s) => !(s.is_empty() || s == "0"),
        Bson::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn to_integer(value: &Bson) -> i64 {
    match value {
        Bson::Int32(v) => *v as i64,
        Bson::Int64(v) => *v,
        Bson::Double(v) if v.is_finite() => v.trunc() as i64,
        Bson::String(s) => leading_number(s).trunc() as i64,
        Bson::Null | Bson::Undefined | Bson::Double(_) => 0,
        other => truthy(other) as i64,
    }
}

fn to_float(value: &Bson) -> f64 {
    match value {
        Bson::Int32(v) => *v as f64,
        Bson::Int64(v) => *v as f64,
        Bson::Double(v) => *v,
        Bson::String(s) => leading_number(s),
        Bson::Null | Bson::Undefined => 0.0,
        other => truthy(other) as i64 as f64,
    }
}

fn to_string(value: Bson) -> Bson {
    Bson::String(match value {
        Bson::String(s) => s,
        Bson::Null | Bson::Undefined => String::new(),
        Bson::Boolean(b) => if b { "1".into() } else { String::new() },
        Bson::Int32(v) => v.to_string(),
        Bson::Int64(v) => v.to_string(),
        Bson::Double(v) => v.to_string(),
        Bson::ObjectId(id) => id.to_hex(),
        Bson::DateTime(dt) => dt.timestamp_millis().to_string(),
        composite @ (Bson::Array(_) | Bson::Document(_)) => return composite,
        other => other.to_string(),
    })
}

/// Parses the longest numeric prefix of `s`, ignoring leading whitespace. Yields `0.0` if none.
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }

    s[..end].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_cast_parses_leading_digits() {
        assert_eq!(Cast::Integer.apply(Bson::String("42abc".into())), Bson::Int64(42));
        assert_eq!(Cast::Integer.apply(Bson::String("  -7".into())), Bson::Int64(-7));
        assert_eq!(Cast::Integer.apply(Bson::String("abc".into())), Bson::Int64(0));
        assert_eq!(Cast::Integer.apply(Bson::Double(3.9)), Bson::Int64(3));
        assert_eq!(Cast::Integer.apply(Bson::Boolean(true)), Bson::Int64(1));
        assert_eq!(Cast::Integer.apply(Bson::Null), Bson::Int64(0));
    }

    #[test]
    fn float_cast_accepts_exponents() {
        assert_eq!(Cast::Float.apply(Bson::String("1.5e2 units".into())), Bson::Double(150.0));
        assert_eq!(Cast::Float.apply(Bson::Int32(2)), Bson::Double(2.0));
    }

    #[test]
    fn boolean_cast_follows_truthiness() {
        assert_eq!(Cast::Boolean.apply(Bson::String("0".into())), Bson::Boolean(false));
        assert_eq!(Cast::Boolean.apply(Bson::String("no".into())), Bson::Boolean(true));
        assert_eq!(Cast::Boolean.apply(Bson::Array(vec![])), Bson::Boolean(false));
        assert_eq!(Cast::Boolean.apply(Bson::Int64(0)), Bson::Boolean(false));
    }

    #[test]
    fn string_cast_renders_scalars() {
        assert_eq!(Cast::String.apply(Bson::Int32(12)), Bson::String("12".into()));
        assert_eq!(Cast::String.apply(Bson::Boolean(true)), Bson::String("1".into()));
        assert_eq!(Cast::String.apply(Bson::Boolean(false)), Bson::String(String::new()));
        assert_eq!(Cast::String.apply(Bson::Double(2.0)), Bson::String("2".into()));
    }

    #[test]
    fn container_casts_wrap_scalars() {
        assert_eq!(Cast::Array.apply(Bson::Int32(1)), Bson::Array(vec![Bson::Int32(1)]));
        assert_eq!(Cast::Array.apply(Bson::Null), Bson::Array(vec![]));
        assert_eq!(
            Cast::Object.apply(Bson::Array(vec!["a".into(), "b".into()])),
            Bson::Document(doc! { "0": "a", "1": "b" })
        );
        assert_eq!(
            Cast::Object.apply(Bson::Int32(5)),
            Bson::Document(doc! { "scalar": 5 })
        );
    }

    #[test]
    fn id_cast_yields_null_for_invalid_text() {
        let id = ObjectId::new();

        assert_eq!(Cast::Id.apply(Bson::String(id.to_hex())), Bson::ObjectId(id));
        assert_eq!(Cast::Id.apply(Bson::ObjectId(id)), Bson::ObjectId(id));
        assert_eq!(Cast::Id.apply(Bson::String("not-an-id".into())), Bson::Null);
    }

    #[test]
    fn undeclared_fields_pass_through() {
        let casts = Casts::new().cast("views", Cast::Integer);

        assert_eq!(casts.apply("views", Bson::String("3".into())), Bson::Int64(3));
        assert_eq!(casts.apply("title", Bson::String("3".into())), Bson::String("3".into()));
    }
}
