//! 비밀 저장소 에러 타입
//!
//! [`SecretStoreError`]는 저장소 백엔드 내부에서 발생하는 에러입니다.
//! 브로커는 요청한 벤더를 붙여 [`BridgeError`]로 변환합니다.
//!
//! - 비밀이 없음 / 페이로드가 자격증명 형식이 아님 → `CredentialNotFound`
//! - 전송 실패, 5xx, 401/403, 저장소 인증 정보 누락 → `SecretStoreUnavailable`

use secbridge_core::error::BridgeError;
use secbridge_core::types::{CloudProvider, Vendor};

/// 비밀 저장소 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    /// 비밀이 존재하지 않음
    #[error("secret '{name}' not found in {store}")]
    NotFound {
        /// 저장소 종류
        store: CloudProvider,
        /// 저장소 고유 비밀 이름
        name: String,
    },

    /// 비밀 페이로드를 해석할 수 없음
    #[error("secret '{name}' in {store} is malformed: {reason}")]
    Malformed {
        store: CloudProvider,
        name: String,
        reason: String,
    },

    /// 저장소가 접근을 거부함 (401/403)
    #[error("{store} denied access (status {status})")]
    AccessDenied { store: CloudProvider, status: u16 },

    /// 저장소 호출 실패 (전송 에러, 5xx 등)
    #[error("{store} request failed: {reason}")]
    Unavailable { store: CloudProvider, reason: String },

    /// 저장소 인증에 필요한 환경 정보가 없음
    #[error("{store} requires environment variable {var}")]
    MissingEnvironment {
        store: CloudProvider,
        var: &'static str,
    },
}

impl SecretStoreError {
    /// 에러가 발생한 저장소
    pub fn store(&self) -> CloudProvider {
        match self {
            Self::NotFound { store, .. }
            | Self::Malformed { store, .. }
            | Self::AccessDenied { store, .. }
            | Self::Unavailable { store, .. }
            | Self::MissingEnvironment { store, .. } => *store,
        }
    }

    /// 요청 벤더를 붙여 최상위 에러로 변환합니다.
    pub fn into_bridge(self, vendor: Vendor) -> BridgeError {
        match self {
            Self::NotFound { .. } | Self::Malformed { .. } => BridgeError::CredentialNotFound {
                vendor,
                reason: self.to_string(),
            },
            Self::AccessDenied { store, .. }
            | Self::Unavailable { store, .. }
            | Self::MissingEnvironment { store, .. } => BridgeError::SecretStoreUnavailable {
                store,
                reason: self.to_string(),
            },
        }
    }
}
