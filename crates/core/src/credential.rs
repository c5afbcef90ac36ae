//! 벤더 자격증명
//!
//! 비밀 저장소에서 읽어온 원시 자격증명입니다. 한 번 읽으면 변경되지 않으며,
//! 로테이션 시에는 통째로 교체됩니다. 디스크에 기록하지 않습니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::BridgeError;
use crate::types::{CloudProvider, Vendor};

/// 벤더 API 자격증명
///
/// `Debug` 출력에는 필드 이름만 포함되며 값은 표시하지 않습니다.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    vendor: Vendor,
    fields: BTreeMap<String, String>,
    source: CloudProvider,
    fetched_at: DateTime<Utc>,
}

impl Credential {
    /// 자격증명을 생성합니다.
    ///
    /// 벤더의 필수 필드가 하나라도 없거나 비어 있으면
    /// `CredentialNotFound`를 반환합니다.
    pub fn new(
        vendor: Vendor,
        fields: BTreeMap<String, String>,
        source: CloudProvider,
    ) -> Result<Self, BridgeError> {
        let missing: Vec<&str> = vendor
            .required_fields()
            .iter()
            .copied()
            .filter(|name| fields.get(*name).is_none_or(|v| v.trim().is_empty()))
            .collect();

        if !missing.is_empty() {
            return Err(BridgeError::CredentialNotFound {
                vendor,
                reason: format!("missing required fields: {}", missing.join(", ")),
            });
        }

        Ok(Self {
            vendor,
            fields,
            source,
            fetched_at: Utc::now(),
        })
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn source(&self) -> CloudProvider {
        self.source
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// 필드 값을 조회합니다.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// 필수 필드 값을 조회합니다. 없으면 `CredentialNotFound`.
    pub fn require(&self, name: &str) -> Result<&str, BridgeError> {
        self.get(name).ok_or_else(|| BridgeError::CredentialNotFound {
            vendor: self.vendor,
            reason: format!("missing field '{name}'"),
        })
    }

    /// 필드 이름 목록
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("vendor", &self.vendor)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("source", &self.source)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}
