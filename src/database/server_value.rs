use serde_json::{Map, Number, Value};

use crate::database::error::{invalid_argument, DatabaseResult};

/// Placeholder replaced with the write time (milliseconds since the epoch).
pub fn server_timestamp() -> Value {
    serde_json::json!({ ".sv": "timestamp" })
}

/// Placeholder that adds `delta` to the number stored at the write location.
pub fn increment(delta: f64) -> Value {
    serde_json::json!({
        ".sv": {
            "increment": delta,
        }
    })
}

pub(crate) fn contains_server_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key(".sv") || map.values().any(contains_server_value),
        Value::Array(items) => items.iter().any(contains_server_value),
        _ => false,
    }
}

/// Replaces placeholders in `value`, reading increments against `current`.
pub(crate) fn resolve_server_values(
    value: Value,
    current: Option<&Value>,
    now_millis: i64,
) -> DatabaseResult<Value> {
    match value {
        Value::Object(mut map) => {
            if let Some(spec) = map.remove(".sv") {
                return resolve_placeholder(spec, current, now_millis);
            }
            let mut resolved = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_current = current.and_then(|curr| curr.get(&key));
                resolved.insert(key, resolve_server_values(child, child_current, now_millis)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for (index, child) in items.into_iter().enumerate() {
                let child_current = current.and_then(|curr| curr.get(index));
                resolved.push(resolve_server_values(child, child_current, now_millis)?);
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other),
    }
}

fn resolve_placeholder(spec: Value, current: Option<&Value>, now_millis: i64) -> DatabaseResult<Value> {
    match spec {
        Value::String(token) if token == "timestamp" => Ok(Value::Number(Number::from(now_millis))),
        Value::Object(mut map) => {
            let delta = map
                .remove("increment")
                .ok_or_else(|| invalid_argument("Unsupported server value placeholder"))?;
            let Some(delta_number) = delta.as_f64() else {
                return Err(invalid_argument("Server increment delta must be numeric"));
            };
            let base = current.and_then(Value::as_f64).unwrap_or(0.0);
            let integral = |v: &Value| v.is_i64() || v.is_u64();
            let both_integral = integral(&delta) && current.map_or(true, integral);
            if both_integral {
                let base = current.and_then(Value::as_i64).unwrap_or(0);
                if let Some(total) = delta.as_i64().and_then(|d| base.checked_add(d)) {
                    return Ok(Value::Number(Number::from(total)));
                }
            }
            Number::from_f64(base + delta_number)
                .map(Value::Number)
                .ok_or_else(|| invalid_argument("Server increment produced an invalid number"))
        }
        _ => Err(invalid_argument("Unsupported server value placeholder")),
    }
}
