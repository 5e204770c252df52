use serde_json::Value;
use sha1::{Digest, Sha1};

pub fn sha1_digest(data: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data.as_ref());
    let result = hasher.finalize();
    let mut buf = [0u8; 20];
    buf.copy_from_slice(&result);
    buf
}

pub fn sha1_hex(data: impl AsRef<[u8]>) -> String {
    let digest = sha1_digest(data);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Content version of a stored node, used as the compare-and-set tag.
pub fn value_etag(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    sha1_hex(canonical)
}

// Object keys are written sorted so equal trees hash equally regardless of
// map ordering.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_hash_matches() {
        let digest = sha1_hex("The quick brown fox jumps over the lazy dog");
        assert_eq!(digest, "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12");
    }

    #[test]
    fn etag_ignores_insertion_order() {
        let left = json!({"a": 1, "b": {"c": true}});
        let mut right = serde_json::Map::new();
        right.insert("b".into(), json!({"c": true}));
        right.insert("a".into(), json!(1));
        assert_eq!(value_etag(&left), value_etag(&Value::Object(right)));
        assert_ne!(value_etag(&left), value_etag(&Value::Null));
    }
}
