//! CrowdStrike 탐지 / 인시던트 정규화

use secbridge_core::event::SecurityEvent;
use secbridge_core::types::{AffectedEntity, EntityKind, EventCategory, Severity};
use serde_json::Value;

use super::{PageBuilder, Rejected, native_id, score_to_severity, text, timestamp};
use crate::crowdstrike::severity_from_display_name;

const RECORDS: &str = "resources";

pub(super) fn normalize(category: EventCategory, body: &Value, page: &mut PageBuilder) {
    if body.get(RECORDS).and_then(Value::as_array).is_none() {
        page.missing_records(RECORDS, body);
        return;
    }
    match category {
        EventCategory::Incident => {
            page.push_array(body, RECORDS, 0, incident);
        }
        _ => {
            page.push_array(body, RECORDS, 0, detection);
        }
    }
}

fn detection(page: &PageBuilder, index: usize, record: &Value) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["detection_id", "composite_id"])?;
    let at = timestamp(
        record,
        &["first_behavior", "created_timestamp", "date_updated"],
        &id,
    )?;

    // 표시 이름 우선, 없으면 0–100 숫자 점수
    let severity = text(record, "max_severity_displayname")
        .and_then(|name| severity_from_display_name(&name))
        .or_else(|| {
            record
                .get("max_severity")
                .and_then(Value::as_i64)
                .map(score_to_severity)
        })
        .unwrap_or(Severity::MEDIAN);

    let mut event = page.event(index, id, severity, at);
    event.entity = text(record, "device.hostname")
        .map(|host| AffectedEntity::new(EntityKind::Host, host))
        .or_else(|| {
            text(record, "device.device_id")
                .map(|device| AffectedEntity::new(EntityKind::Host, device))
        });
    event.title = text(record, "behaviors.0.display_name")
        .or_else(|| text(record, "behaviors.0.scenario"));

    let mut event = event.with_tag("kind:detection");
    if let Some(status) = text(record, "status") {
        event = event.with_tag(format!("status:{status}"));
    }
    if let Some(tactic) = text(record, "behaviors.0.tactic") {
        event = event.with_tag(format!("tactic:{}", tactic.to_lowercase()));
    }
    if let Some(technique) = text(record, "behaviors.0.technique_id") {
        event = event.with_tag(format!("technique:{technique}"));
    }
    Ok(event)
}

fn incident(page: &PageBuilder, index: usize, record: &Value) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["incident_id"])?;
    let at = timestamp(record, &["start", "created", "modified_timestamp"], &id)?;

    let severity = record
        .get("fine_score")
        .and_then(Value::as_i64)
        .map_or(Severity::MEDIAN, score_to_severity);

    let mut event = page.event(index, id, severity, at);
    event.entity = text(record, "hosts.0.hostname")
        .map(|host| AffectedEntity::new(EntityKind::Host, host));
    event.title = text(record, "name").or_else(|| text(record, "description"));

    let mut event = event.with_tag("kind:incident");
    if let Some(status) = record.get("status").and_then(Value::as_i64) {
        event = event.with_tag(format!("status:{}", incident_status_name(status)));
    }
    for tactic in record
        .get("tactics")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        event = event.with_tag(format!("tactic:{}", tactic.to_lowercase()));
    }
    Ok(event)
}

fn incident_status_name(code: i64) -> String {
    match code {
        20 => "new".to_owned(),
        25 => "reopened".to_owned(),
        30 => "in_progress".to_owned(),
        40 => "closed".to_owned(),
        other => other.to_string(),
    }
}
