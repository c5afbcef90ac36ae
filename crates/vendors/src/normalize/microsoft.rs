//! Microsoft Graph 보안 알림 / 위험 사용자 / 로그인 로그 정규화

use secbridge_core::event::SecurityEvent;
use secbridge_core::types::{AffectedEntity, EntityKind, EventCategory, Severity};
use serde_json::Value;

use super::{PageBuilder, Rejected, native_id, text, timestamp};
use crate::microsoft::severity_from_level;

const RECORDS: &str = "value";

pub(super) fn normalize(category: EventCategory, body: &Value, page: &mut PageBuilder) {
    if body.get(RECORDS).and_then(Value::as_array).is_none() {
        page.missing_records(RECORDS, body);
        return;
    }
    match category {
        EventCategory::IdentityRisk if is_sign_in_page(body) => {
            page.push_array(body, RECORDS, 0, sign_in);
        }
        EventCategory::IdentityRisk => {
            page.push_array(body, RECORDS, 0, risky_user);
        }
        _ => {
            page.push_array(body, RECORDS, 0, alert);
        }
    }
}

/// 로그인 로그 페이지 판별: OData context 우선, 없으면 첫 레코드의 필드로 판단
fn is_sign_in_page(body: &Value) -> bool {
    if let Some(context) = body.get("@odata.context").and_then(Value::as_str) {
        return context.contains("auditLogs/signIns");
    }
    body.get(RECORDS)
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .is_some_and(|record| record.get("riskLevelDuringSignIn").is_some())
}

fn level(record: &Value, field: &str) -> Severity {
    text(record, field)
        .and_then(|name| severity_from_level(&name))
        .unwrap_or(Severity::MEDIAN)
}

fn alert(page: &PageBuilder, index: usize, record: &Value) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["id"])?;
    let at = timestamp(record, &["createdDateTime", "firstActivityDateTime"], &id)?;

    let mut event = page.event(index, id, level(record, "severity"), at);
    event.entity = evidence_entity(record);
    event.title = text(record, "title");

    let mut event = event.with_tag("kind:alert");
    for (prefix, field) in [
        ("service", "serviceSource"),
        ("category", "category"),
        ("status", "status"),
    ] {
        if let Some(value) = text(record, field) {
            event = event.with_tag(format!("{prefix}:{value}"));
        }
    }
    Ok(event)
}

/// 첫 번째로 식별 가능한 evidence를 엔티티로 사용합니다.
fn evidence_entity(record: &Value) -> Option<AffectedEntity> {
    let evidence = record.get("evidence").and_then(Value::as_array)?;
    evidence.iter().find_map(|item| {
        let kind = item
            .get("@odata.type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if kind.ends_with("userEvidence") {
            text(item, "userAccount.userPrincipalName")
                .or_else(|| text(item, "userAccount.accountName"))
                .map(|user| AffectedEntity::new(EntityKind::User, user))
        } else if kind.ends_with("deviceEvidence") {
            text(item, "deviceDnsName")
                .or_else(|| text(item, "mdeDeviceId"))
                .map(|host| AffectedEntity::new(EntityKind::Host, host))
        } else if kind.ends_with("mailboxEvidence") {
            text(item, "primaryAddress")
                .map(|mailbox| AffectedEntity::new(EntityKind::Mailbox, mailbox))
        } else {
            None
        }
    })
}

fn risky_user(page: &PageBuilder, index: usize, record: &Value) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["id"])?;
    let at = timestamp(record, &["riskLastUpdatedDateTime"], &id)?;

    let mut event = page.event(index, id, level(record, "riskLevel"), at);
    event.entity = text(record, "userPrincipalName")
        .map(|user| AffectedEntity::new(EntityKind::User, user));
    event.title = text(record, "riskDetail");

    let mut event = event.with_tag("kind:risky-user");
    if let Some(state) = text(record, "riskState") {
        event = event.with_tag(format!("status:{state}"));
    }
    Ok(event)
}

fn sign_in(page: &PageBuilder, index: usize, record: &Value) -> Result<SecurityEvent, Rejected> {
    let id = native_id(record, &["id"])?;
    let at = timestamp(record, &["createdDateTime"], &id)?;

    let mut event = page.event(index, id, level(record, "riskLevelDuringSignIn"), at);
    event.entity = text(record, "userPrincipalName")
        .map(|user| AffectedEntity::new(EntityKind::User, user));
    event.title = text(record, "appDisplayName").map(|app| format!("Sign-in to {app}"));

    let mut event = event.with_tag("kind:sign-in");
    // errorCode 0 = 성공
    if let Some(code) = text(record, "status.errorCode") {
        let result = if code == "0" { "success" } else { "failure" };
        event = event.with_tag(format!("result:{result}"));
    }
    for (prefix, field) in [("status", "riskState"), ("ip", "ipAddress")] {
        if let Some(value) = text(record, field) {
            event = event.with_tag(format!("{prefix}:{value}"));
        }
    }
    Ok(event)
}
