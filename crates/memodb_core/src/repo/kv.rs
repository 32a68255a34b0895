//! Single-item key/value store for small pieces of runtime state.

use crate::db::Tables;
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads and deserializes the item under `key`.
pub fn get<T: DeserializeOwned>(t: &Tables, key: &str) -> CoreResult<Option<T>> {
    t.kv.get(key)
        .map(|v| {
            serde_json::from_value(v.clone())
                .map_err(|e| CoreError::codec(format!("decode kv item {key}: {e}")))
        })
        .transpose()
}

/// Serializes and stores `value` under `key`.
pub fn set<T: Serialize>(t: &mut Tables, key: &str, value: &T) -> CoreResult<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| CoreError::codec(format!("encode kv item {key}: {e}")))?;
    t.kv.insert(key.to_string(), value);
    Ok(())
}

/// Removes the item under `key`. Returns true if it existed.
pub fn remove(t: &mut Tables, key: &str) -> bool {
    t.kv.remove(key).is_some()
}
