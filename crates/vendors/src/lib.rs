//! secbridge 벤더 연동 크레이트
//!
//! 세 보안 벤더 API를 하나의 정규화된 인터페이스로 묶습니다.
//!
//! # 모듈 구성
//!
//! - [`rate_limit`]: 벤더별 토큰 버킷, 지수 백오프 재시도
//! - [`token_cache`]: 토큰 키별 single-flight 토큰 캐시
//! - [`http`]: 토큰 첨부, 401/403 재인증, HTTP 결과 분류
//! - [`client`]: [`VendorClient`] trait, 페이지 커서, 벤더 선택 enum
//! - [`crowdstrike`]: 엔드포인트 탐지 클라이언트 (오프셋 페이지네이션, 호스트/인텔/취약점 조회)
//! - [`microsoft`]: 아이덴티티/컴플라이언스/로그인 로그 클라이언트 (nextLink 페이지네이션)
//! - [`proofpoint`]: 이메일 위협 클라이언트 (시간 윈도우 페이지네이션)
//! - [`normalize`]: 벤더 응답 → [`SecurityEvent`](secbridge_core::SecurityEvent)
//! - [`facade`]: 모든 벤더에 대한 `fetch` / `probe`
//!
//! # 아키텍처
//!
//! ```text
//! SecurityFacade -> VendorClient -> VendorHttp -> TokenCache -> CredentialBroker
//!       |                              |              |
//!   normalize                     RateLimiter    RateLimiter (token exchange)
//! ```
//!
//! # 사용 예시
//!
//! ```no_run
//! # async fn example() -> Result<(), secbridge_core::BridgeError> {
//! use std::sync::Arc;
//! use secbridge_core::{BridgeConfig, EventCategory, EventFilter, Severity};
//! use secbridge_credentials::{CredentialBroker, Environment};
//! use secbridge_vendors::SecurityFacade;
//!
//! let config = BridgeConfig::default();
//! let http = reqwest::Client::new();
//! let broker = CredentialBroker::from_environment(&config, &Environment::capture(), http.clone())?;
//! let facade = SecurityFacade::from_config(&config, Arc::new(broker), http)?;
//!
//! let filter = EventFilter::new().min_severity(Severity::High);
//! let outcome = facade.fetch(&[EventCategory::Detection], &filter, 5).collect().await;
//! for event in &outcome.events {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod crowdstrike;
pub mod facade;
pub mod http;
pub mod microsoft;
pub mod normalize;
pub mod proofpoint;
pub mod rate_limit;
pub mod token_cache;

#[cfg(test)]
mod testing;

// --- 주요 타입 re-export ---

// 클라이언트
pub use client::{AnyVendorClient, PageCursor, Pager, VendorClient, VendorRequest, VendorResponse};
pub use crowdstrike::{
    CveDetails, EndpointDetectionClient, HostDetails, IndicatorType, IntelIndicator, Vulnerability,
    VulnerableHost,
};
pub use microsoft::IdentitySuiteClient;
pub use proofpoint::MailGatewayClient;

// 퍼사드
pub use facade::{
    FetchItem, FetchOutcome, FetchStream, ProbeReport, ProbeSummary, SecurityFacade, VendorFailure,
};

// 인증 / 요청 한도
pub use http::VendorHttp;
pub use rate_limit::{BackoffPolicy, Operation, RateLimitState, RateLimiter};
pub use token_cache::{AccessToken, TokenCache, TokenExchange, TokenState};

// 정규화
pub use normalize::normalize;
