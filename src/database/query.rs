use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::database::error::{internal_error, invalid_argument, DatabaseResult};
use crate::database::tree::{get_at_path, split_path};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum QueryIndex {
    #[default]
    Key,
    Child(String),
}

/// Ordering, inclusive range and limit applied to the children of a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    pub index: QueryIndex,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
    pub limit_to_first: Option<u32>,
}

impl QueryParams {
    pub fn order_by_key() -> Self {
        Self::default()
    }

    pub fn order_by_child(path: impl Into<String>) -> DatabaseResult<Self> {
        let path = path.into();
        if path.starts_with('$') {
            return Err(invalid_argument(format!(
                "order_by_child(\"{path}\") is invalid; use order_by_key() instead"
            )));
        }
        split_path(&path)?;
        Ok(Self {
            index: QueryIndex::Child(path),
            ..Self::default()
        })
    }

    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    pub fn limit_to_first(mut self, limit: u32) -> Self {
        self.limit_to_first = Some(limit);
        self
    }

    /// Builds parameters from the host's flat query arguments.
    ///
    /// An empty `order_by` orders by key, a non-positive `limit` means no
    /// limit and empty bounds are open. Bounds are read as JSON scalars when
    /// they parse as one (`10`, `true`, `"text"`) and as plain strings
    /// otherwise.
    pub fn from_boundary(order_by: &str, limit: i32, start_at: &str, end_at: &str) -> DatabaseResult<Self> {
        let order_by = order_by.trim();
        let mut params = if order_by.is_empty() || order_by == "$key" {
            Self::order_by_key()
        } else {
            Self::order_by_child(order_by)?
        };
        let as_key = params.index == QueryIndex::Key;
        params.start_at = parse_bound(start_at, as_key);
        params.end_at = parse_bound(end_at, as_key);
        if limit > 0 {
            params.limit_to_first = Some(limit as u32);
        }
        Ok(params)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_rest_params(&self) -> DatabaseResult<Vec<(String, String)>> {
        let mut params = Vec::new();
        if self.is_default() {
            return Ok(params);
        }

        let order_by = match &self.index {
            QueryIndex::Key => "$key",
            QueryIndex::Child(child) => child.as_str(),
        };
        params.push(("orderBy".to_string(), encode(&Value::from(order_by), "orderBy")?));
        if let Some(bound) = &self.start_at {
            params.push(("startAt".to_string(), encode(bound, "startAt")?));
        }
        if let Some(bound) = &self.end_at {
            params.push(("endAt".to_string(), encode(bound, "endAt")?));
        }
        if let Some(limit) = self.limit_to_first {
            params.push(("limitToFirst".to_string(), limit.to_string()));
        }
        Ok(params)
    }

    /// Applies the query to a node held locally, returning the selected
    /// children as an object (`None` when nothing matches).
    pub fn apply(&self, node: Option<&Value>) -> DatabaseResult<Option<Value>> {
        let mut children: Vec<(String, &Value)> = match node {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => return Ok(None),
        };

        let child_path = match &self.index {
            QueryIndex::Child(path) => Some(split_path(path)?),
            QueryIndex::Key => None,
        };
        let sort_value = |key: &str, value: &Value| -> Value {
            match &child_path {
                Some(path) => get_at_path(value, path).cloned().unwrap_or(Value::Null),
                None => Value::String(key.to_owned()),
            }
        };

        children.sort_by(|(ka, va), (kb, vb)| {
            let ordering = match &child_path {
                Some(_) => compare_values(&sort_value(ka, va), &sort_value(kb, vb)),
                None => Ordering::Equal,
            };
            ordering.then_with(|| compare_keys(ka, kb))
        });

        let in_range = |key: &str, value: &Value| -> bool {
            let probe = sort_value(key, value);
            let cmp = |bound: &Value| match &child_path {
                Some(_) => compare_values(&probe, bound),
                None => compare_keys(key, bound.as_str().unwrap_or_default()),
            };
            self.start_at.as_ref().map_or(true, |b| cmp(b) != Ordering::Less)
                && self.end_at.as_ref().map_or(true, |b| cmp(b) != Ordering::Greater)
        };

        let limit = self.limit_to_first.map(|l| l as usize).unwrap_or(usize::MAX);
        let selected: Map<String, Value> = children
            .into_iter()
            .filter(|(key, value)| in_range(key, value))
            .take(limit)
            .map(|(key, value)| (key, value.clone()))
            .collect();

        if selected.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(selected)))
        }
    }
}

fn parse_bound(raw: &str, as_key: bool) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    let parsed = match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
        _ => Value::String(raw.to_owned()),
    };
    if as_key {
        return Some(match parsed {
            Value::String(text) => Value::String(text),
            _ => Value::String(raw.to_owned()),
        });
    }
    Some(parsed)
}

fn encode(value: &Value, name: &str) -> DatabaseResult<String> {
    serde_json::to_string(value).map_err(|err| internal_error(format!("Failed to encode {name}: {err}")))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Realtime Database value order: null, false, true, numbers, strings, objects.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Keys that parse as 32-bit integers sort numerically ahead of other keys.
pub(crate) fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<i32>(), b.parse::<i32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
