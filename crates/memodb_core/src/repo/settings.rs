//! Stored settings, keyed by dotted key path.

use crate::db::Tables;
use serde_json::Value;
use std::collections::BTreeMap;

/// Returns the stored value for `key`.
pub fn get<'a>(t: &'a Tables, key: &str) -> Option<&'a Value> {
    t.settings.get(key)
}

/// Stores `value` under `key`, returning the previous value.
pub fn set(t: &mut Tables, key: &str, value: Value) -> Option<Value> {
    t.settings.insert(key.to_string(), value)
}

/// Every stored setting.
pub fn all(t: &Tables) -> &BTreeMap<String, Value> {
    &t.settings
}
