//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 벤더, 클라우드, 이벤트 카테고리, 심각도, 영향받는 엔티티 등
//! 모든 크레이트가 공유하는 데이터 구조를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 연동 대상 보안 벤더
///
/// 각 벤더는 인증 방식, 페이지네이션 방식, 이벤트 스키마가 모두 다릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// 엔드포인트 탐지 플랫폼 (CrowdStrike Falcon)
    CrowdStrike,
    /// 아이덴티티/메일/컴플라이언스 스위트 (Microsoft Defender, Entra ID, Purview)
    Microsoft,
    /// 이메일 위협 게이트웨이 (Proofpoint TAP)
    Proofpoint,
}

impl Vendor {
    /// 모든 벤더 (고정 순서)
    pub const ALL: [Vendor; 3] = [Vendor::CrowdStrike, Vendor::Microsoft, Vendor::Proofpoint];

    /// 로그/메트릭 레이블용 고정 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrowdStrike => "crowdstrike",
            Self::Microsoft => "microsoft",
            Self::Proofpoint => "proofpoint",
        }
    }

    /// 비밀 저장소에서 사용하는 논리 이름
    ///
    /// 어떤 저장소가 응답하든 논리 이름은 벤더별로 고정입니다.
    /// 저장소별 실제 이름 변환은 각 백엔드가 담당합니다.
    pub fn secret_name(&self) -> &'static str {
        match self {
            Self::CrowdStrike => "crowdstrike/api-credentials",
            Self::Microsoft => "microsoft/api-credentials",
            Self::Proofpoint => "proofpoint/api-credentials",
        }
    }

    /// 자격증명 JSON에 반드시 있어야 하는 필드
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::CrowdStrike => &["client_id", "client_secret"],
            Self::Microsoft => &["tenant_id", "client_id", "client_secret"],
            Self::Proofpoint => &["service_principal", "secret"],
        }
    }

    /// 벤더가 제공하는 이벤트 카테고리
    pub fn categories(&self) -> &'static [EventCategory] {
        match self {
            Self::CrowdStrike => &[EventCategory::Detection, EventCategory::Incident],
            Self::Microsoft => &[EventCategory::Alert, EventCategory::IdentityRisk],
            Self::Proofpoint => &[EventCategory::EmailThreat],
        }
    }

    /// 문자열에서 벤더를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "crowdstrike" | "falcon" => Some(Self::CrowdStrike),
            "microsoft" | "defender" | "entra" => Some(Self::Microsoft),
            "proofpoint" | "tap" => Some(Self::Proofpoint),
            _ => None,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 비밀 저장소를 제공하는 클라우드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// AWS Secrets Manager
    Aws,
    /// Azure Key Vault
    Azure,
    /// GCP Secret Manager
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "azure" => Some(Self::Azure),
            "gcp" | "google" => Some(Self::Gcp),
            _ => None,
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 정규화된 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    /// 엔드포인트 탐지
    Detection,
    /// 인시던트 (탐지 묶음)
    Incident,
    /// 보안/컴플라이언스 알림
    Alert,
    /// 아이덴티티 위험 (위험 사용자)
    IdentityRisk,
    /// 이메일 위협
    EmailThreat,
}

impl EventCategory {
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Detection,
        EventCategory::Incident,
        EventCategory::Alert,
        EventCategory::IdentityRisk,
        EventCategory::EmailThreat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Incident => "incident",
            Self::Alert => "alert",
            Self::IdentityRisk => "identity-risk",
            Self::EmailThreat => "email-threat",
        }
    }

    /// 문자열에서 카테고리를 파싱합니다. 복수형과 밑줄 표기도 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "detection" | "detections" => Some(Self::Detection),
            "incident" | "incidents" => Some(Self::Incident),
            "alert" | "alerts" => Some(Self::Alert),
            "identity-risk" | "identity-risks" => Some(Self::IdentityRisk),
            "email-threat" | "email-threats" => Some(Self::EmailThreat),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심각도 레벨 (정규화된 0–4 서열)
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
/// 직렬화 시에는 서열 값(0–4)으로 표현되며, 범위를 벗어난 값은 역직렬화에 실패합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    /// 정보성 이벤트 (0)
    Info,
    /// 낮은 심각도 (1)
    Low,
    /// 중간 심각도 (2), 매핑되지 않은 값의 기본값
    #[default]
    Medium,
    /// 높은 심각도 (3)
    High,
    /// 치명적 (4)
    Critical,
}

impl Severity {
    /// 매핑되지 않은 벤더 심각도에 사용하는 중앙값
    pub const MEDIAN: Severity = Severity::Medium;

    /// 정규화된 서열 값 (0–4)
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// 서열 값에서 심각도를 생성합니다. 0–4 밖이면 `None`.
    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Info),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            4 => Some(Self::Critical),
            _ => None,
        }
    }

    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 숫자 서열("0"–"4")도 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" | "0" => Some(Self::Info),
            "low" | "1" => Some(Self::Low),
            "medium" | "med" | "2" => Some(Self::Medium),
            "high" | "3" => Some(Self::High),
            "critical" | "crit" | "4" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.ordinal()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_ordinal(value).ok_or_else(|| format!("severity out of range: {value}"))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// 영향받는 엔티티 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// 호스트 (호스트명, FQDN, 디바이스 ID)
    Host,
    /// 사용자 (UPN, 계정명)
    User,
    /// 메일박스 (수신자 주소)
    Mailbox,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::User => write!(f, "user"),
            Self::Mailbox => write!(f, "mailbox"),
        }
    }
}

/// 이벤트가 영향을 준 엔티티
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AffectedEntity {
    /// 엔티티 유형
    pub kind: EntityKind,
    /// 벤더가 제공한 식별자
    pub identifier: String,
}

impl AffectedEntity {
    pub fn new(kind: EntityKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for AffectedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

/// 토큰 캐시 키
///
/// 대부분의 벤더는 벤더당 토큰 하나를 사용하지만, 서비스별 scope가 다른
/// 벤더는 `vendor/sub-service` 형태로 서브 키를 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    /// 토큰 소유 벤더
    pub vendor: Vendor,
    /// 서브 서비스 이름 (없으면 벤더 단일 토큰)
    pub sub_service: Option<&'static str>,
}

impl TokenKey {
    /// 벤더 단일 토큰 키
    pub fn vendor(vendor: Vendor) -> Self {
        Self {
            vendor,
            sub_service: None,
        }
    }

    /// 서브 서비스 토큰 키
    pub fn scoped(vendor: Vendor, sub_service: &'static str) -> Self {
        Self {
            vendor,
            sub_service: Some(sub_service),
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_service {
            Some(sub) => write!(f, "{}/{}", self.vendor, sub),
            None => write!(f, "{}", self.vendor),
        }
    }
}
