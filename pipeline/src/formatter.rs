//! Turns scrubbed events into the outbound line format: one compact JSON
//! object per event, keys sorted, nested `data` flattened under
//! `dimension.data.`.

use crate::model::ScrubbedEvent;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const DATA_PREFIX: &str = "dimension.data.";

/// Single-level view of an event. Keys iterate in lexicographic order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlattenedRecord {
    fields: BTreeMap<String, Value>,
}

impl FlattenedRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<&ScrubbedEvent> for FlattenedRecord {
    fn from(event: &ScrubbedEvent) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("idempotencyKey".to_string(), Value::from(event.id.as_str()));
        fields.insert("eventName".to_string(), Value::from(event.event_type.as_str()));
        fields.insert("timestamp".to_string(), Value::from(event.time.as_str()));
        fields.insert("customerId".to_string(), Value::from(event.tenant_id.as_str()));

        flatten_into(&event.data, DATA_PREFIX, &mut fields);

        FlattenedRecord { fields }
    }
}

/// Compact JSON, no whitespace.
impl fmt::Display for FlattenedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}

// Only leaves produce entries; objects contribute their key to the path.
fn flatten_into(data: &Map<String, Value>, prefix: &str, out: &mut BTreeMap<String, Value>) {
    for (key, value) in data {
        let full_key = format!("{prefix}{key}");
        match value {
            Value::Object(nested) => flatten_into(nested, &format!("{full_key}."), out),
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_) => {
                out.insert(full_key, value.clone());
            }
        }
    }
}

/// Serializes one event to its outbound line.
pub fn flatten(event: &ScrubbedEvent) -> String {
    FlattenedRecord::from(event).to_string()
}

/// Serializes events in order, one line each, without a trailing newline.
pub fn write<'a, I>(events: I) -> String
where
    I: IntoIterator<Item = &'a ScrubbedEvent>,
{
    events.into_iter().map(flatten).collect::<Vec<_>>().join("\n")
}
