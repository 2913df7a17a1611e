use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// A CloudEvent 1.0 envelope as it arrives on the wire.
///
/// Attribute names are matched ignoring ASCII case (`tenantid`, `tenantId`
/// and `tenantID` are the same attribute), and when an attribute appears
/// more than once the last occurrence wins. A `null` string attribute
/// leaves the field as it was. Unknown attributes are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawEvent {
    pub id: String,
    pub specversion: String,
    pub tenantid: String,
    pub userid: String,
    pub sessionid: String,
    pub source: String,
    /// The `type` attribute
    pub event_type: String,
    pub time: String,
    pub host: String,
    pub originip: String,
    pub ownerid: String,
    pub toplevelresourceid: String,
    pub spaceid: String,
    pub clientid: String,
    pub reason: String,
    /// Anything JSON can express. Only objects (or null/absent) survive scrubbing.
    pub data: Option<Value>,
}

impl RawEvent {
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    fn attribute_mut(&mut self, name: &str) -> Option<&mut String> {
        let field = match name {
            "id" => &mut self.id,
            "specversion" => &mut self.specversion,
            "tenantid" => &mut self.tenantid,
            "userid" => &mut self.userid,
            "sessionid" => &mut self.sessionid,
            "source" => &mut self.source,
            "type" => &mut self.event_type,
            "time" => &mut self.time,
            "host" => &mut self.host,
            "originip" => &mut self.originip,
            "ownerid" => &mut self.ownerid,
            "toplevelresourceid" => &mut self.toplevelresourceid,
            "spaceid" => &mut self.spaceid,
            "clientid" => &mut self.clientid,
            "reason" => &mut self.reason,
            _ => return None,
        };
        Some(field)
    }
}

impl<'de> Deserialize<'de> for RawEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RawEventVisitor)
    }
}

struct RawEventVisitor;

impl<'de> Visitor<'de> for RawEventVisitor {
    type Value = RawEvent;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a CloudEvent object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<RawEvent, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut event = RawEvent::default();

        while let Some(key) = map.next_key::<String>()? {
            let name = key.to_ascii_lowercase();
            if name == "data" {
                event.data = map.next_value()?;
            } else if let Some(field) = event.attribute_mut(&name) {
                if let Some(value) = map.next_value::<Option<String>>()? {
                    *field = value;
                }
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }

        Ok(event)
    }
}

/// A telemetry event restricted to the allow-listed attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScrubbedEvent {
    pub id: String,
    pub spec_version: String,
    pub tenant_id: String,
    pub user_id: String,
    pub session_id: String,
    pub source: String,
    pub event_type: String,
    pub time: String,
    pub host: String,
    pub origin_ip: String,
    pub owner_id: String,
    pub top_level_resource_id: String,
    pub space_id: String,
    pub client_id: String,
    pub reason: String,
    pub data: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_lowercase_attributes() {
        let payload = br#"{
            "id": "e-1",
            "specversion": "1.0",
            "tenantid": "t-1",
            "userid": "u-1",
            "type": "com.qlik.v1.app.created",
            "time": "2025-08-21T10:00:00Z",
            "originip": "10.0.0.1",
            "toplevelresourceid": "r-1",
            "data": {"a": 1}
        }"#;

        let event = RawEvent::from_slice(payload).unwrap();
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.tenantid, "t-1");
        assert_eq!(event.userid, "u-1");
        assert_eq!(event.event_type, "com.qlik.v1.app.created");
        assert_eq!(event.originip, "10.0.0.1");
        assert_eq!(event.toplevelresourceid, "r-1");
        assert_eq!(event.data, Some(json!({"a": 1})));
        assert_eq!(event.host, "");
    }

    #[test]
    fn test_decode_camel_case_spellings() {
        let payload = br#"{"id": "e-2", "tenantId": "t-2", "specVersion": "1.0", "spaceId": "s-1", "extra": true}"#;

        let event = RawEvent::from_slice(payload).unwrap();
        assert_eq!(event.tenantid, "t-2");
        assert_eq!(event.specversion, "1.0");
        assert_eq!(event.spaceid, "s-1");
        assert_eq!(event.data, None);
    }

    #[test]
    fn test_decode_rejects_wrong_shapes() {
        assert!(RawEvent::from_slice(b"not json").is_err());
        assert!(RawEvent::from_slice(b"[1, 2, 3]").is_err());
        assert!(RawEvent::from_slice(br#"{"id": 12}"#).is_err());
    }

    #[test]
    fn test_attribute_names_ignore_case() {
        let payload = br#"{"ID": "e-4", "tenantID": "t-4", "Type": "a.b", "TopLevelResourceID": "r"}"#;

        let event = RawEvent::from_slice(payload).unwrap();
        assert_eq!(event.id, "e-4");
        assert_eq!(event.tenantid, "t-4");
        assert_eq!(event.event_type, "a.b");
        assert_eq!(event.toplevelresourceid, "r");
    }

    #[test]
    fn test_last_spelling_wins() {
        let event =
            RawEvent::from_slice(br#"{"tenantid": "first", "tenantId": "second"}"#).unwrap();
        assert_eq!(event.tenantid, "second");

        let event =
            RawEvent::from_slice(br#"{"tenantId": "first", "tenantid": "second"}"#).unwrap();
        assert_eq!(event.tenantid, "second");
    }

    #[test]
    fn test_null_attribute_leaves_field_unchanged() {
        let event = RawEvent::from_slice(br#"{"id": null, "host": "h", "HOST": null}"#).unwrap();
        assert_eq!(event.id, "");
        assert_eq!(event.host, "h");
    }

    #[test]
    fn test_null_data_decodes_as_absent() {
        let event = RawEvent::from_slice(br#"{"id": "e-3", "data": null}"#).unwrap();
        assert_eq!(event.data, None);
    }
}
