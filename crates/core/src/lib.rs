//! secbridge 공통 크레이트
//!
//! 벤더 클라이언트, 자격증명 브로커, CLI가 공유하는 도메인 타입과
//! 에러 분류, 설정 로딩, 메트릭 이름을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`types`]: 벤더/클라우드/카테고리/심각도 등 기본 도메인 타입
//! - [`event`]: 정규화된 [`SecurityEvent`]와 부분 실패 기록
//! - [`credential`]: 비밀 저장소에서 읽어온 [`Credential`]
//! - [`filter`]: 벤더 공통 조회 필터 [`EventFilter`]
//! - [`error`]: [`BridgeError`] 에러 분류
//! - [`config`]: `secbridge.toml` 설정
//! - [`health`]: 헬스 체크 상태
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod filter;
pub mod health;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{BridgeError, ConfigError};

// 설정
pub use config::BridgeConfig;

// 자격증명
pub use credential::Credential;

// 이벤트
pub use event::{NormalizedPage, RawRef, SecurityEvent, SkippedRecord};

// 필터
pub use filter::{EventFilter, FilterValue};

// 헬스
pub use health::HealthStatus;

// 도메인 타입
pub use types::{AffectedEntity, CloudProvider, EntityKind, EventCategory, Severity, TokenKey, Vendor};
