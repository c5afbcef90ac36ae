//! 벤더 응답 정규화
//!
//! 벤더별 원본 페이지(JSON)를 [`SecurityEvent`] 목록으로 변환합니다.
//! 레코드 하나의 변환 실패는 [`SkippedRecord`]로 기록되고, 같은 페이지의
//! 나머지 레코드는 계속 처리됩니다.
//!
//! # 심각도 매핑
//!
//! | 벤더 / 카테고리               | 원본 필드                                   | 매핑                                          |
//! |-------------------------------|---------------------------------------------|-----------------------------------------------|
//! | CrowdStrike detection         | `max_severity_displayname` / `max_severity` | Informational..Critical → 0..4, 숫자는 `/20` |
//! | CrowdStrike incident          | `fine_score`                                | `/20`, 최대 4                                 |
//! | Microsoft alert               | `severity`                                  | informational/low/medium/high → 0..3          |
//! | Microsoft identity-risk       | `riskLevel`                                 | none/low/medium/high → 0..3                   |
//! | Proofpoint email-threat       | `classification` / `threatsInfoMap`         | malware 4, phish/impostor 3, spam 1, 기타 2  |
//!
//! 매핑할 수 없는 값은 중앙값(`Medium`, 2)으로 처리합니다.
//!
//! # 사용 예시
//! ```ignore
//! use secbridge_vendors::normalize::normalize;
//!
//! let page = normalize(response.vendor, response.category, &response);
//! for event in &page.events {
//!     println!("{event}");
//! }
//! ```

mod crowdstrike;
mod microsoft;
mod proofpoint;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use secbridge_core::event::{NormalizedPage, RawRef, SecurityEvent, SkippedRecord};
use secbridge_core::metrics as m;
use secbridge_core::types::{EventCategory, Severity, Vendor};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::VendorResponse;

/// 한 페이지를 정규화합니다.
///
/// 레코드 배열이 없는 페이지는 빈 결과를 반환합니다.
pub fn normalize(
    vendor: Vendor,
    category: EventCategory,
    page: &VendorResponse,
) -> NormalizedPage {
    let mut builder = PageBuilder::new(vendor, category, page.id);

    match vendor {
        Vendor::CrowdStrike => crowdstrike::normalize(category, &page.body, &mut builder),
        Vendor::Microsoft => microsoft::normalize(category, &page.body, &mut builder),
        Vendor::Proofpoint => proofpoint::normalize(category, &page.body, &mut builder),
    }

    builder.finish()
}

/// 레코드 변환 실패 사유
#[derive(Debug)]
pub(crate) struct Rejected {
    native_id: Option<String>,
    reason: String,
}

impl Rejected {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            native_id: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn with_id(mut self, native_id: &str) -> Self {
        self.native_id = Some(native_id.to_owned());
        self
    }
}

/// 페이지 단위 정규화 결과 누적기
pub(crate) struct PageBuilder {
    vendor: Vendor,
    category: EventCategory,
    response_id: Uuid,
    page: NormalizedPage,
}

impl PageBuilder {
    fn new(vendor: Vendor, category: EventCategory, response_id: Uuid) -> Self {
        Self {
            vendor,
            category,
            response_id,
            page: NormalizedPage::default(),
        }
    }

    pub(crate) fn raw_ref(&self, index: usize) -> RawRef {
        RawRef {
            response_id: self.response_id,
            index,
        }
    }

    /// 필수 필드만 채운 이벤트를 만듭니다.
    pub(crate) fn event(
        &self,
        index: usize,
        native_id: String,
        severity: Severity,
        timestamp: DateTime<Utc>,
    ) -> SecurityEvent {
        SecurityEvent {
            source: self.vendor,
            native_id,
            category: self.category,
            severity,
            timestamp,
            entity: None,
            raw_ref: self.raw_ref(index),
            tags: BTreeSet::new(),
            title: None,
        }
    }

    pub(crate) fn push(&mut self, index: usize, result: Result<SecurityEvent, Rejected>) {
        match result {
            Ok(event) => self.page.events.push(event),
            Err(rejected) => {
                debug!(
                    vendor = %self.vendor,
                    category = %self.category,
                    index,
                    native_id = rejected.native_id.as_deref().unwrap_or("-"),
                    reason = %rejected.reason,
                    "record skipped"
                );
                self.page.skipped.push(SkippedRecord {
                    source: self.vendor,
                    raw_ref: self.raw_ref(index),
                    native_id: rejected.native_id,
                    reason: rejected.reason,
                });
            }
        }
    }

    /// 배열 필드의 레코드를 순서대로 변환합니다. `first_index`부터 번호를 매깁니다.
    ///
    /// 처리한 레코드 수를 반환합니다.
    pub(crate) fn push_array<F>(
        &mut self,
        body: &Value,
        field: &str,
        first_index: usize,
        mut convert: F,
    ) -> usize
    where
        F: FnMut(&Self, usize, &Value) -> Result<SecurityEvent, Rejected>,
    {
        let Some(records) = body.get(field).and_then(Value::as_array) else {
            return 0;
        };
        for (offset, record) in records.iter().enumerate() {
            let index = first_index + offset;
            let result = if record.is_object() {
                convert(self, index, record)
            } else {
                Err(Rejected::new("record is not a JSON object"))
            };
            self.push(index, result);
        }
        records.len()
    }

    /// 예상한 배열 필드가 없는 페이지를 기록합니다.
    pub(crate) fn missing_records(&self, field: &str, body: &Value) {
        if !body.is_null() {
            warn!(
                vendor = %self.vendor,
                category = %self.category,
                field,
                "response has no record array"
            );
        }
    }

    fn finish(self) -> NormalizedPage {
        let events = u64::try_from(self.page.events.len()).unwrap_or(u64::MAX);
        let skipped = u64::try_from(self.page.skipped.len()).unwrap_or(u64::MAX);
        metrics::counter!(
            m::EVENTS_NORMALIZED_TOTAL,
            m::LABEL_VENDOR => self.vendor.as_str(),
            m::LABEL_CATEGORY => self.category.as_str()
        )
        .increment(events);
        if skipped > 0 {
            metrics::counter!(
                m::RECORDS_SKIPPED_TOTAL,
                m::LABEL_VENDOR => self.vendor.as_str(),
                m::LABEL_CATEGORY => self.category.as_str()
            )
            .increment(skipped);
        }
        self.page
    }
}

/// dot 경로로 문자열 필드를 추출합니다. 빈 문자열은 없는 것으로 봅니다.
///
/// 숫자 값은 문자열로 변환합니다.
pub(crate) fn text(record: &Value, path: &str) -> Option<String> {
    let mut current = record;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => current.get(part)?,
        };
    }
    match current {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 후보 경로 중 첫 번째로 값이 있는 필드를 ID로 사용합니다.
pub(crate) fn native_id(record: &Value, paths: &[&str]) -> Result<String, Rejected> {
    paths
        .iter()
        .find_map(|path| text(record, path))
        .ok_or_else(|| Rejected::new(format!("missing id ({})", paths.join(" | "))))
}

/// 후보 경로 중 첫 번째로 값이 있는 필드를 타임스탬프로 파싱합니다.
pub(crate) fn timestamp(
    record: &Value,
    paths: &[&str],
    native_id: &str,
) -> Result<DateTime<Utc>, Rejected> {
    let Some((path, value)) = paths
        .iter()
        .find_map(|path| lookup(record, path).map(|value| (*path, value)))
    else {
        return Err(
            Rejected::new(format!("missing timestamp ({})", paths.join(" | "))).with_id(native_id),
        );
    };
    parse_timestamp(value).ok_or_else(|| {
        Rejected::new(format!("unparseable timestamp in {path}: {value}")).with_id(native_id)
    })
}

fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    (!current.is_null()).then_some(current)
}

/// 타임스탬프 값을 UTC로 파싱합니다.
///
/// 지원 형식:
/// - RFC 3339 (ISO 8601): `2024-01-15T12:00:00Z`, `2024-01-15T21:00:00+09:00`
/// - Unix timestamp (초): `1705320000`
/// - Unix timestamp (밀리초): `1705320000000`
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let epoch = match value {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                return Some(dt.with_timezone(&Utc));
            }
            s.trim().parse::<i64>().ok()?
        }
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };

    // 10자리 = 초, 13자리 = 밀리초
    if epoch.unsigned_abs() > 9_999_999_999 {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}

/// 0–100 점수를 20점 단위 서열로 변환합니다 (최대 4).
pub(crate) fn score_to_severity(score: i64) -> Severity {
    let ordinal = (score.clamp(0, 100) / 20).min(4);
    u8::try_from(ordinal)
        .ok()
        .and_then(Severity::from_ordinal)
        .unwrap_or(Severity::MEDIAN)
}
