//! Stored document representation
//!
//! Documents are JSON objects in relaxed extended JSON form: dates are
//! written as `{"$date": "<RFC 3339>"}` so a store can recognise them for
//! TTL handling.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// A stored document
pub type Document = Map<String, Value>;

/// Identity field of every stored document
pub const ID_FIELD: &str = "_id";

const DATE_KEY: &str = "$date";

/// Encode a timestamp as an extended JSON date
pub fn date_value(date: DateTime<Utc>) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert(
        DATE_KEY.to_string(),
        Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Value::Object(wrapper)
}

/// Decode an extended JSON date.
///
/// Accepts both the relaxed (`"$date": "<RFC 3339>"`) and canonical
/// (`"$date": <millis>`) forms.
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let inner = value.as_object()?.get(DATE_KEY)?;
    match inner {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// The `_id` of a document, if it is a string
pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Resolve a dotted field path inside a document
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Equality filter over one or more field paths
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    criteria: Vec<(String, Value)>,
}

impl Query {
    /// Match documents whose `field` equals `value`
    pub fn where_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            criteria: vec![(field.into(), value.into())],
        }
    }

    /// Match documents by identity
    pub fn by_id(id: &str) -> Self {
        Self::where_eq(ID_FIELD, id)
    }

    /// Add another equality criterion
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push((field.into(), value.into()));
        self
    }

    /// The `(field, value)` pairs of this query
    pub fn criteria(&self) -> &[(String, Value)] {
        &self.criteria
    }

    /// Whether the document satisfies every criterion.
    ///
    /// A `null` criterion also matches a missing field.
    pub fn matches(&self, document: &Document) -> bool {
        self.criteria
            .iter()
            .all(|(field, expected)| match lookup(document, field) {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_date_value_roundtrip() {
        let date = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let value = date_value(date);
        assert_eq!(value, json!({ "$date": "2023-11-14T22:13:20.123Z" }));
        assert_eq!(as_date(&value), Some(date));
    }

    #[test]
    fn test_canonical_date() {
        let value = json!({ "$date": 1_700_000_000_000i64 });
        assert_eq!(
            as_date(&value),
            DateTime::from_timestamp_millis(1_700_000_000_000)
        );
        assert_eq!(as_date(&json!("2023-11-14")), None);
    }

    #[test]
    fn test_query_on_nested_path() {
        let document = doc(json!({
            "_id": "abc",
            "attrs": { "cartId": "cart-X" },
            "principal": null
        }));

        assert!(Query::where_eq("attrs.cartId", "cart-X").matches(&document));
        assert!(!Query::where_eq("attrs.cartId", "cart-Y").matches(&document));
        assert!(Query::by_id("abc").matches(&document));
        assert!(Query::where_eq("principal", Value::Null).matches(&document));
        assert!(Query::where_eq("missing", Value::Null).matches(&document));
        assert!(!Query::by_id("abc").and("attrs.cartId", "nope").matches(&document));
    }
}
