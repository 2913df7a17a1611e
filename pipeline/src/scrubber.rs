use crate::errors::ScrubError;
use crate::model::{RawEvent, ScrubbedEvent};
use serde_json::{Map, Value};

/// Keeps the allow-listed attributes of a raw event and nothing else.
///
/// `data` is moved over untouched. An absent `data` becomes an empty mapping,
/// any non-object `data` is rejected.
pub fn scrub(event: RawEvent) -> Result<ScrubbedEvent, ScrubError> {
    let data = match event.data {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => return Err(ScrubError::NonObjectData(json_kind(&other))),
    };

    Ok(ScrubbedEvent {
        id: event.id,
        spec_version: event.specversion,
        tenant_id: event.tenantid,
        user_id: event.userid,
        session_id: event.sessionid,
        source: event.source,
        event_type: event.event_type,
        time: event.time,
        host: event.host,
        origin_ip: event.originip,
        owner_id: event.ownerid,
        top_level_resource_id: event.toplevelresourceid,
        space_id: event.spaceid,
        client_id: event.clientid,
        reason: event.reason,
        data,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
