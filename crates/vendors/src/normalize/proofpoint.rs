//! Proofpoint TAP 메시지 / 클릭 이벤트 정규화
//!
//! SIEM 응답은 네 개의 배열로 나뉘며, 인덱스는 배열 순서대로 이어서
//! 매깁니다 (`RECORD_ARRAYS` 순서).

use secbridge_core::event::SecurityEvent;
use secbridge_core::types::{AffectedEntity, EntityKind, EventCategory, Severity};
use serde_json::Value;

use super::{PageBuilder, Rejected, native_id, text, timestamp};
use crate::proofpoint::RECORD_ARRAYS;

pub(super) fn normalize(_category: EventCategory, body: &Value, page: &mut PageBuilder) {
    if RECORD_ARRAYS
        .iter()
        .all(|field| body.get(*field).and_then(Value::as_array).is_none())
    {
        page.missing_records("messagesDelivered", body);
        return;
    }

    let mut next_index = 0;
    for field in RECORD_ARRAYS {
        let kind = RecordKind::from_array(field);
        next_index += page.push_array(body, field, next_index, |page, index, record| {
            convert(page, index, record, kind)
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct RecordKind {
    click: bool,
    tag: &'static str,
    disposition: &'static str,
}

impl RecordKind {
    fn from_array(field: &str) -> Self {
        match field {
            "messagesBlocked" => Self {
                click: false,
                tag: "kind:message",
                disposition: "disposition:blocked",
            },
            "clicksPermitted" => Self {
                click: true,
                tag: "kind:click",
                disposition: "disposition:permitted",
            },
            "clicksBlocked" => Self {
                click: true,
                tag: "kind:click",
                disposition: "disposition:blocked",
            },
            _ => Self {
                click: false,
                tag: "kind:message",
                disposition: "disposition:delivered",
            },
        }
    }
}

/// 위협 분류별 심각도
fn classification_severity(classification: &str) -> Severity {
    match classification.to_ascii_lowercase().as_str() {
        "malware" => Severity::Critical,
        "phish" | "impostor" => Severity::High,
        "spam" => Severity::Low,
        _ => Severity::MEDIAN,
    }
}

fn convert(
    page: &PageBuilder,
    index: usize,
    record: &Value,
    kind: RecordKind,
) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["GUID", "id"])?;
    let at = if kind.click {
        timestamp(record, &["clickTime", "threatTime"], &id)?
    } else {
        timestamp(record, &["messageTime"], &id)?
    };

    // 메시지는 threatsInfoMap 중 가장 높은 분류를 사용합니다
    let classifications: Vec<String> = if kind.click {
        text(record, "classification").into_iter().collect()
    } else {
        record
            .get("threatsInfoMap")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|threat| text(threat, "classification"))
            .collect()
    };
    let severity = classifications
        .iter()
        .map(|c| classification_severity(c))
        .max()
        .unwrap_or(Severity::MEDIAN);

    let recipient = if kind.click {
        text(record, "recipient")
    } else {
        record
            .get("recipient")
            .and_then(Value::as_array)
            .and_then(|all| all.iter().find_map(Value::as_str))
            .map(str::to_owned)
            .or_else(|| text(record, "recipient"))
    };

    let mut event = page.event(index, id, severity, at);
    event.entity = recipient.map(|mailbox| AffectedEntity::new(EntityKind::Mailbox, mailbox));
    event.title = if kind.click {
        text(record, "url")
    } else {
        text(record, "subject")
    };

    let mut event = event.with_tag(kind.tag).with_tag(kind.disposition);
    for classification in classifications {
        event = event.with_tag(format!("classification:{}", classification.to_lowercase()));
    }
    Ok(event)
}
