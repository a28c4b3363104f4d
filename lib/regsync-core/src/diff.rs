//! Structural diffing of current and desired service configs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value as JsonValue;

/// A single difference between the current and desired configs of a service.
///
/// Keys are paths of the form `<address>` for whole records, or `<address>.<field>` for a single field of a record
/// present on both sides. When a service has several records on the same address, later ones are suffixed with
/// `#<n>`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ConfigChange {
    /// Present in the desired config only.
    Added { key: String, value: JsonValue },

    /// Present in the current config only.
    Removed { key: String, value: JsonValue },

    /// Present on both sides with different values.
    Modified {
        key: String,
        old_value: JsonValue,
        new_value: JsonValue,
    },
}

impl ConfigChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Modified { key, .. } => key,
        }
    }
}

/// The differences between a service's current and desired configs.
///
/// Records are matched by address, so the order either side lists them in does not matter. An empty diff means the
/// two sides are equal.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigDiff {
    changes: Vec<ConfigChange>,
}

impl ConfigDiff {
    /// Diffs `current` against `desired`.
    pub fn between<C, D>(current: &[C], desired: &[D]) -> Self
    where
        C: Serialize,
        D: Serialize,
    {
        let old_records = index_by_address(current);
        let new_records = index_by_address(desired);
        let addresses = old_records.keys().chain(new_records.keys()).collect::<BTreeSet<_>>();

        let mut changes = Vec::new();
        for address in addresses {
            let old = old_records.get(address).map(Vec::as_slice).unwrap_or_default();
            let new = new_records.get(address).map(Vec::as_slice).unwrap_or_default();

            for i in 0..old.len().max(new.len()) {
                let key = if i == 0 {
                    address.clone()
                } else {
                    format!("{}#{}", address, i)
                };

                match (old.get(i), new.get(i)) {
                    (Some(old_value), Some(new_value)) => diff_recursive(old_value, new_value, &key, &mut changes),
                    (Some(old_value), None) => changes.push(ConfigChange::Removed {
                        key,
                        value: old_value.clone(),
                    }),
                    (None, Some(new_value)) => changes.push(ConfigChange::Added {
                        key,
                        value: new_value.clone(),
                    }),
                    (None, None) => {}
                }
            }
        }

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[ConfigChange] {
        &self.changes
    }
}

fn index_by_address<T: Serialize>(records: &[T]) -> BTreeMap<String, Vec<JsonValue>> {
    let mut indexed = BTreeMap::<String, Vec<JsonValue>>::new();
    for record in records {
        let value = serde_json::to_value(record).unwrap_or(JsonValue::Null);
        let address = match value.get("address") {
            Some(JsonValue::String(address)) => address.clone(),
            Some(JsonValue::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        indexed.entry(address).or_default().push(value);
    }

    for values in indexed.values_mut() {
        values.sort_by_key(JsonValue::to_string);
    }

    indexed
}

fn diff_recursive(old_value: &JsonValue, new_value: &JsonValue, path: &str, changes: &mut Vec<ConfigChange>) {
    if old_value == new_value {
        return;
    }

    let (Some(old_map), Some(new_map)) = (old_value.as_object(), new_value.as_object()) else {
        changes.push(ConfigChange::Modified {
            key: path.to_string(),
            old_value: old_value.clone(),
            new_value: new_value.clone(),
        });
        return;
    };

    let keys = old_map.keys().chain(new_map.keys()).collect::<BTreeSet<_>>();
    for key in keys {
        let current_path = format!("{}.{}", path, key);
        match (old_map.get(key), new_map.get(key)) {
            (Some(old), Some(new)) => diff_recursive(old, new, &current_path, changes),
            (Some(old), None) => changes.push(ConfigChange::Removed {
                key: current_path,
                value: old.clone(),
            }),
            (None, Some(new)) => changes.push(ConfigChange::Added {
                key: current_path,
                value: new.clone(),
            }),
            (None, None) => {}
        }
    }
}
