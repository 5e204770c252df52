//! Path and tree helpers shared by the store backends.

use serde_json::{Map, Value};

use crate::database::error::{invalid_argument, DatabaseResult};

const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Canonical text form of a path: no leading, trailing or doubled slashes.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Splits a path into validated segments. The empty path is the root.
pub fn split_path(path: &str) -> DatabaseResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid_argument(
                "Database path cannot contain empty segments",
            ));
        }
        if let Some(ch) = segment.chars().find(|ch| FORBIDDEN_KEY_CHARS.contains(ch)) {
            return Err(invalid_argument(format!(
                "Database path segment '{segment}' contains forbidden character '{ch}'"
            )));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

pub(crate) fn join_path(segments: &[String]) -> String {
    segments.join("/")
}

pub(crate) fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Null => None,
        value => Some(value),
    }
}

/// Writes `value` at `path`, creating intermediate objects. Writing `null`
/// deletes the node.
pub(crate) fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    if value.is_null() {
        delete_at_path(root, path);
        return;
    }
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        current = object_mut(current)
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(current).insert(last.clone(), value);
}

/// Removes the node at `path` and prunes parents left empty.
pub(crate) fn delete_at_path(root: &mut Value, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Value::Object(obj) = root else {
        return;
    };
    if parents.is_empty() {
        obj.remove(last);
        return;
    }
    let Some(child) = obj.get_mut(&parents[0]) else {
        return;
    };
    let mut rest = parents[1..].to_vec();
    rest.push(last.clone());
    delete_at_path(child, &rest);
    if matches!(child, Value::Object(map) if map.is_empty()) {
        obj.remove(&parents[0]);
    }
}

pub(crate) fn path_starts_with(path: &[String], prefix: &[String]) -> bool {
    if prefix.len() > path.len() {
        return false;
    }
    path.iter()
        .zip(prefix.iter())
        .all(|(left, right)| left == right)
}

/// True when one path is an ancestor of (or equal to) the other.
pub(crate) fn paths_related(a: &[String], b: &[String]) -> bool {
    path_starts_with(a, b) || path_starts_with(b, a)
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(path: &str) -> Vec<String> {
        split_path(path).unwrap()
    }

    #[test]
    fn normalize_collapses_slashes() {
        assert_eq!(normalize_path("/a//b/"), "a/b");
        assert_eq!(normalize_path("///"), "");
    }

    #[test]
    fn split_rejects_forbidden_characters() {
        assert_eq!(segs("/users/ada/"), vec!["users", "ada"]);
        assert!(segs("").is_empty());
        assert!(split_path("a//b").is_err());
        assert!(split_path("scores/a.b").is_err());
        assert!(split_path("rooms/$key").is_err());
    }

    #[test]
    fn set_get_delete_nested_nodes() {
        let mut root = json!({});
        set_at_path(&mut root, &segs("a/b/c"), json!(1));
        set_at_path(&mut root, &segs("a/d"), json!("x"));
        assert_eq!(get_at_path(&root, &segs("a/b/c")), Some(&json!(1)));

        delete_at_path(&mut root, &segs("a/b/c"));
        assert_eq!(root, json!({"a": {"d": "x"}}));

        set_at_path(&mut root, &segs("a/d"), Value::Null);
        assert_eq!(root, json!({}));
        assert_eq!(get_at_path(&root, &segs("a")), None);
    }

    #[test]
    fn set_replaces_scalar_parents() {
        let mut root = json!({"a": 5});
        set_at_path(&mut root, &segs("a/b"), json!(true));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn related_paths() {
        assert!(paths_related(&segs("a"), &segs("a/b")));
        assert!(paths_related(&segs("a/b"), &segs("a")));
        assert!(paths_related(&segs(""), &segs("a")));
        assert!(!paths_related(&segs("a/b"), &segs("a/c")));
    }
}
