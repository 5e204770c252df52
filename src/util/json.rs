use serde_json::{Map, Value};
use std::fmt;

/// Snapshot text reported for absent or empty nodes.
pub const EMPTY_SNAPSHOT: &str = "{}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Malformed(String),
    NotAnObject(&'static str),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Malformed(message) => write!(f, "Invalid JSON payload: {message}"),
            CodecError::NotAnObject(found) => {
                write!(f, "Invalid JSON payload: expected an object, found {found}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

/// Parses a host payload into a document tree.
///
/// Empty text, whitespace and the literal `null` decode to `None` (a delete
/// when written). Anything else must be a JSON object; nested objects and
/// arrays are kept as they are.
pub fn decode_document(text: &str) -> Result<Option<Value>, CodecError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(trimmed)? {
        Value::Null => Ok(None),
        value @ Value::Object(_) => Ok(Some(value)),
        other => Err(CodecError::NotAnObject(kind_of(&other))),
    }
}

/// Parses the child map used by merge updates. An empty payload is an empty map.
pub fn decode_updates(text: &str) -> Result<Map<String, Value>, CodecError> {
    match decode_document(text)? {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(CodecError::NotAnObject(kind_of(&other))),
        None => Ok(Map::new()),
    }
}

/// Renders a snapshot the way host callbacks expect it.
///
/// Strings come back as `"text"` without escaping; numbers and booleans as
/// their literal text.
pub fn encode_snapshot(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => EMPTY_SNAPSHOT.to_string(),
        Some(Value::String(text)) => format!("\"{text}\""),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn make_json_string(key: &str, value: &str) -> String {
    single_entry(key, Value::String(value.to_owned()))
}

pub fn make_json_int(key: &str, value: i64) -> String {
    single_entry(key, Value::from(value))
}

pub fn make_json_float(key: &str, value: f64) -> String {
    single_entry(key, Value::from(value))
}

pub fn make_json_bool(key: &str, value: bool) -> String {
    single_entry(key, Value::Bool(value))
}

/// Merges several single- or multi-key objects into one. Later keys win;
/// parts that are not objects are skipped.
pub fn combine_json<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut combined = Map::new();
    for part in parts {
        if let Ok(Some(Value::Object(map))) = decode_document(part.as_ref()) {
            combined.extend(map);
        }
    }
    Value::Object(combined).to_string()
}

/// Reads one top-level field. Strings are returned unquoted, everything else
/// as compact JSON.
pub fn get_json_value(json: &str, key: &str) -> Option<String> {
    let Ok(Some(Value::Object(map))) = decode_document(json) else {
        return None;
    };
    match map.get(key)? {
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn single_entry(key: &str, value: Value) -> String {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_owned(), value);
    Value::Object(map).to_string()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_document_survives_decode_and_encode() {
        let text = r#"{"player":{"name":"ada","stats":{"level":3,"alive":true}}}"#;
        let decoded = decode_document(text).unwrap().unwrap();
        assert_eq!(
            decoded,
            json!({"player": {"name": "ada", "stats": {"level": 3, "alive": true}}})
        );
        let reparsed: Value = serde_json::from_str(&encode_snapshot(Some(&decoded))).unwrap();
        assert_eq!(reparsed, decoded);
    }

    #[test]
    fn empty_input_decodes_to_none() {
        assert_eq!(decode_document("").unwrap(), None);
        assert_eq!(decode_document("   \n").unwrap(), None);
        assert_eq!(decode_document("null").unwrap(), None);
        assert!(decode_updates("").unwrap().is_empty());
    }

    #[test]
    fn absent_snapshot_encodes_as_empty_object() {
        assert_eq!(encode_snapshot(None), "{}");
        assert_eq!(encode_snapshot(Some(&Value::Null)), "{}");
    }

    #[test]
    fn scalars_use_minimal_quoting() {
        assert_eq!(encode_snapshot(Some(&json!("hello"))), "\"hello\"");
        assert_eq!(encode_snapshot(Some(&json!("say \"hi\""))), "\"say \"hi\"\"");
        assert_eq!(encode_snapshot(Some(&json!(42))), "42");
        assert_eq!(encode_snapshot(Some(&json!(1.5))), "1.5");
        assert_eq!(encode_snapshot(Some(&json!(false))), "false");
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert_eq!(
            decode_document("[1,2]"),
            Err(CodecError::NotAnObject("an array"))
        );
        assert!(matches!(
            decode_document("{oops"),
            Err(CodecError::Malformed(_))
        ));
        assert!(decode_updates("\"text\"").is_err());
    }

    #[test]
    fn helpers_build_and_read_objects() {
        let combined = combine_json([
            make_json_string("name", "ada"),
            make_json_int("score", 10),
            make_json_bool("alive", true),
            make_json_float("ratio", 0.5),
            "not json".to_string(),
        ]);
        let value: Value = serde_json::from_str(&combined).unwrap();
        assert_eq!(
            value,
            json!({"name": "ada", "score": 10, "alive": true, "ratio": 0.5})
        );
        assert_eq!(get_json_value(&combined, "name").as_deref(), Some("ada"));
        assert_eq!(get_json_value(&combined, "score").as_deref(), Some("10"));
        assert_eq!(get_json_value(&combined, "missing"), None);
        assert_eq!(combine_json(Vec::<String>::new()), "{}");
    }
}
