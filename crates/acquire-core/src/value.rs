//! Helpers over the CBOR data model used for payloads.
//!
//! Payloads are arbitrary structured data, so they are carried as
//! [`ciborium::value::Value`] rather than a fixed Rust type.

pub use ciborium::value::Value;

/// Build a `(key, value)` map entry with a text key.
pub fn entry(key: &str, value: impl Into<Value>) -> (Value, Value) {
    (Value::Text(key.to_string()), value.into())
}

/// Build a map from text-keyed entries, keeping their order.
pub fn text_map<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| entry(k, v)).collect())
}

/// An empty map.
pub fn empty_map() -> Value {
    Value::Map(Vec::new())
}

/// Look up a text key in a map's entries.
pub fn get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

/// Look up a text key if `value` is a map.
pub fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_map().and_then(|m| get(m, key))
}

/// Look up a text field, treating `null` as absent.
pub fn get_text<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a str> {
    match get(map, key) {
        Some(Value::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}
