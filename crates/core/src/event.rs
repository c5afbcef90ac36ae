//! 정규화된 보안 이벤트
//!
//! 세 벤더의 서로 다른 응답 스키마는 모두 [`SecurityEvent`] 하나로 변환됩니다.
//! 다운스트림 AI 트리아지 / ML 이상 탐지 코드는 이 타입만 소비합니다.
//!
//! 정규화에 실패한 레코드는 [`SkippedRecord`]로 기록되며, 같은 페이지의
//! 다른 레코드를 버리지 않습니다.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AffectedEntity, EventCategory, Severity, Vendor};

/// 원본 페이로드 참조
///
/// 이벤트가 어느 응답 페이지의 몇 번째 레코드에서 왔는지 가리킵니다.
/// 원본 JSON 자체는 이벤트에 복사하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawRef {
    /// 벤더 응답 ID (`VendorResponse::id`)
    pub response_id: Uuid,
    /// 페이지 내 레코드 인덱스
    pub index: usize,
}

/// 정규화된 보안 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// 원본 벤더
    pub source: Vendor,
    /// 벤더 고유 ID
    pub native_id: String,
    /// 이벤트 카테고리
    pub category: EventCategory,
    /// 정규화된 심각도 (0–4)
    pub severity: Severity,
    /// 발생 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 영향받는 엔티티
    pub entity: Option<AffectedEntity>,
    /// 원본 페이로드 참조
    pub raw_ref: RawRef,
    /// 태그 (정렬된 집합)
    pub tags: BTreeSet<String>,
    /// 사람이 읽을 수 있는 제목 (벤더가 제공하는 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SecurityEvent {
    /// 태그를 추가합니다. 빈 문자열은 무시합니다.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !tag.is_empty() {
            self.tags.insert(tag);
        }
        self
    }

    /// 필터의 최소 심각도를 만족하는지 확인합니다.
    pub fn meets(&self, min_severity: Option<Severity>) -> bool {
        min_severity.is_none_or(|min| self.severity >= min)
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} {} sev={}",
            self.timestamp.to_rfc3339(),
            self.source,
            self.category,
            self.native_id,
            self.severity.ordinal(),
        )?;
        if let Some(entity) = &self.entity {
            write!(f, " entity={entity}")?;
        }
        Ok(())
    }
}

/// 정규화하지 못한 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// 원본 벤더
    pub source: Vendor,
    /// 원본 페이로드 참조
    pub raw_ref: RawRef,
    /// 벤더 ID (읽을 수 있었던 경우)
    pub native_id: Option<String>,
    /// 건너뛴 이유
    pub reason: String,
}

/// 한 페이지의 정규화 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPage {
    /// 정규화된 이벤트
    pub events: Vec<SecurityEvent>,
    /// 건너뛴 레코드
    pub skipped: Vec<SkippedRecord>,
}

impl NormalizedPage {
    /// 이벤트와 스킵 모두 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.skipped.is_empty()
    }

    /// 처리한 레코드 수 (이벤트 + 스킵)
    pub fn record_count(&self) -> usize {
        self.events.len() + self.skipped.len()
    }
}
