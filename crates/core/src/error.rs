//! 에러 타입 -- 도메인별 에러 정의
//!
//! 모든 실패는 벤더 범위로 한정됩니다. 한 벤더의 실패가 다른 벤더의
//! 요청을 중단시키지 않도록, 에러에는 항상 원인 벤더가 포함됩니다.

use std::time::Duration;

use crate::types::{CloudProvider, Vendor};

/// secbridge 최상위 에러 타입
///
/// 토큰 캐시의 single-flight 대기자들이 같은 실패 결과를 공유할 수 있도록
/// `Clone`을 구현합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// 설정 관련 에러 (재시도하지 않음)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 비밀 저장소에 자격증명이 없거나 필수 필드가 누락됨
    #[error("credential not found for {vendor}: {reason}")]
    CredentialNotFound { vendor: Vendor, reason: String },

    /// 비밀 저장소에 접근할 수 없음
    #[error("secret store {store} unavailable: {reason}")]
    SecretStoreUnavailable { store: CloudProvider, reason: String },

    /// 토큰 교환 또는 재인증 실패
    #[error("authentication failed for {vendor}: {reason}")]
    AuthenticationFailed { vendor: Vendor, reason: String },

    /// 요청 한도 초과 (재시도 예산 소진 또는 윈도우 리셋이 너무 멀리 있음)
    #[error("rate limited by {vendor}{}", fmt_retry_after(.retry_after))]
    RateLimited {
        vendor: Vendor,
        retry_after: Option<Duration>,
    },

    /// 재시도 가능한 upstream 실패가 최대 시도 횟수까지 반복됨
    #[error("{vendor} retries exhausted after {attempts} attempts{}", fmt_last_status(.last_status))]
    Exhausted {
        vendor: Vendor,
        attempts: u32,
        last_status: Option<u16>,
    },

    /// 재시도 불가능한 upstream 응답
    #[error("{vendor} upstream error (status {status}): {reason}")]
    Upstream {
        vendor: Vendor,
        status: u16,
        reason: String,
    },

    /// 호출자 지정 타임아웃 초과 (재시도하지 않음)
    #[error("{vendor} request timed out after {elapsed_ms}ms")]
    Timeout { vendor: Vendor, elapsed_ms: u64 },

    /// 응답 본문 디코딩 실패
    #[error("failed to decode {vendor} response: {reason}")]
    Decode { vendor: Vendor, reason: String },
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

fn fmt_last_status(last_status: &Option<u16>) -> String {
    match last_status {
        Some(status) => format!(" (last status {status})"),
        None => String::new(),
    }
}

impl BridgeError {
    /// 에러의 원인 벤더 (설정/저장소 에러는 벤더와 무관)
    pub fn vendor(&self) -> Option<Vendor> {
        match self {
            Self::Config(_) | Self::SecretStoreUnavailable { .. } => None,
            Self::CredentialNotFound { vendor, .. }
            | Self::AuthenticationFailed { vendor, .. }
            | Self::RateLimited { vendor, .. }
            | Self::Exhausted { vendor, .. }
            | Self::Upstream { vendor, .. }
            | Self::Timeout { vendor, .. }
            | Self::Decode { vendor, .. } => Some(*vendor),
        }
    }

    /// 메트릭/로그 레이블용 에러 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::CredentialNotFound { .. } => "credential_not_found",
            Self::SecretStoreUnavailable { .. } => "secret_store_unavailable",
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::RateLimited { .. } => "rate_limited",
            Self::Exhausted { .. } => "exhausted",
            Self::Upstream { .. } => "upstream",
            Self::Timeout { .. } => "timeout",
            Self::Decode { .. } => "decode",
        }
    }
}

/// 설정 관련 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파일 읽기 실패
    #[error("failed to read config file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 배포 마커에서 클라우드를 감지할 수 없음
    #[error("no cloud context detected: set one of {markers}")]
    CloudNotDetected { markers: String },

    /// 벤더 필터에 사용할 수 없는 값
    #[error("invalid filter '{field}': {reason}")]
    InvalidFilter { field: String, reason: String },
}
