use crate::CacheError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Derive a cache key for a logical call `operation(args..., **kwargs)`.
///
/// Arguments are serialized to JSON and every object is rewritten with sorted
/// keys before hashing, so two calls that only differ in keyword order map to
/// the same key. The key is the hex md5 digest of the canonical form.
pub fn cache_key<A, K>(
    operation: &str,
    args: &A,
    kwargs: &K,
) -> Result<String, CacheError>
where
    A: Serialize + ?Sized,
    K: Serialize + ?Sized,
{
    let mut call = Map::new();
    call.insert("args".to_string(), canonical(serde_json::to_value(args)?));
    call.insert(
        "kwargs".to_string(),
        canonical(serde_json::to_value(kwargs)?),
    );
    call.insert("op".to_string(), Value::String(operation.to_string()));

    let canonical_form = serde_json::to_string(&Value::Object(call))?;
    Ok(format!("{:x}", md5::compute(canonical_form.as_bytes())))
}

fn canonical(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(canonical).collect())
        }
        other => other,
    }
}
