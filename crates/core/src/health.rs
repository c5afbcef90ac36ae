//! 헬스 체크 상태
//!
//! 벤더 프로브 결과를 하나의 상태로 집계합니다. 전체 상태는
//! 활성화된 구성 요소 중 가장 나쁜 상태입니다.
//!
//! - 모두 Healthy → Healthy
//! - Degraded가 있고 Unhealthy가 없음 → Degraded(reason)
//! - Unhealthy가 하나라도 있음 → Unhealthy(reason)

use std::fmt;

use serde::{Deserialize, Serialize};

/// 구성 요소 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 일부 기능 저하 (예: 한 카테고리만 실패)
    Degraded(String),
    /// 사용 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 이름이 붙은 구성 요소 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 구성 요소 이름 (예: "crowdstrike/detection")
    pub name: String,
    /// 설정에서 활성화되었는지 여부
    pub enabled: bool,
    /// 현재 상태
    pub status: HealthStatus,
}

/// 여러 구성 요소의 상태를 하나로 집계합니다.
///
/// 비활성화된 구성 요소는 무시합니다.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for component in components.iter().filter(|c| c.enabled) {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", component.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", component.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
