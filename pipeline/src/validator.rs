use crate::model::RawEvent;

/// An event is processable when it names its type, its time and its tenant.
/// Only presence is checked; `time` is not parsed.
pub fn is_valid(event: &RawEvent) -> bool {
    !event.event_type.is_empty() && !event.time.is_empty() && !event.tenantid.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, tenant_id: &str, time: &str) -> RawEvent {
        RawEvent {
            event_type: event_type.into(),
            tenantid: tenant_id.into(),
            time: time.into(),
            specversion: "1.0".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_valid() {
        let cases = [
            ("", "tenant_id", "time", false),
            ("com.qlik.v1.audit.purged", "tenant_id", "", false),
            ("com.qlik.v1.ai-platform.scan-job.triggered", "", "time", false),
            ("", "", "", false),
            ("com.qlik.v1.ai-platform.scan-job.triggered", "tenant_id", "time", true),
        ];

        for (event_type, tenant_id, time, expected) in cases {
            assert_eq!(
                is_valid(&event(event_type, tenant_id, time)),
                expected,
                "type={event_type:?} tenant={tenant_id:?} time={time:?}"
            );
        }
    }

    #[test]
    fn test_other_attributes_do_not_matter() {
        let mut e = event("a.b", "t", "not-a-timestamp");
        assert!(is_valid(&e));

        e.id = String::new();
        e.specversion = String::new();
        e.data = Some(serde_json::json!("scalar"));
        assert!(is_valid(&e));
    }
}
