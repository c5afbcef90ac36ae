//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! 라이브러리는 레코더(exporter)를 설치하지 않습니다. 레코더가 없으면
//! 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `secbridge_`
//! - 구성 요소: `vendor_`, `token_`, `credential_`, `normalizer_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//! use secbridge_core::metrics;
//!
//! counter!(metrics::VENDOR_REQUESTS_TOTAL, metrics::LABEL_VENDOR => "crowdstrike").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 벤더 레이블 키 (crowdstrike, microsoft, proofpoint)
pub const LABEL_VENDOR: &str = "vendor";

/// 카테고리 레이블 키 (detection, incident, alert, identity-risk, email-threat)
pub const LABEL_CATEGORY: &str = "category";

/// 클라우드 레이블 키 (aws, azure, gcp)
pub const LABEL_CLOUD: &str = "cloud";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 에러 종류 레이블 키 (`BridgeError::kind()`)
pub const LABEL_ERROR_KIND: &str = "error_kind";

// ─── 벤더 요청 메트릭 ──────────────────────────────────────────────

/// 벤더 API 요청 수 (counter, label: vendor, result)
pub const VENDOR_REQUESTS_TOTAL: &str = "secbridge_vendor_requests_total";

/// 재시도 수 (counter, label: vendor)
pub const VENDOR_RETRIES_TOTAL: &str = "secbridge_vendor_retries_total";

/// 요청 한도 초과 응답 수 (counter, label: vendor)
pub const VENDOR_RATE_LIMITED_TOTAL: &str = "secbridge_vendor_rate_limited_total";

/// 벤더 요청 소요 시간 (histogram, 초, label: vendor)
pub const VENDOR_REQUEST_DURATION_SECONDS: &str = "secbridge_vendor_request_duration_seconds";

// ─── 토큰 / 자격증명 메트릭 ────────────────────────────────────────

/// 토큰 발급 시도 수 (counter, label: vendor, result)
pub const TOKEN_FETCHES_TOTAL: &str = "secbridge_token_fetches_total";

/// 토큰 무효화 수 (counter, label: vendor)
pub const TOKEN_INVALIDATIONS_TOTAL: &str = "secbridge_token_invalidations_total";

/// 비밀 저장소 조회 수 (counter, label: cloud, result)
pub const CREDENTIAL_FETCHES_TOTAL: &str = "secbridge_credential_fetches_total";

// ─── 정규화 메트릭 ─────────────────────────────────────────────────

/// 정규화된 이벤트 수 (counter, label: vendor, category)
pub const EVENTS_NORMALIZED_TOTAL: &str = "secbridge_events_normalized_total";

/// 건너뛴 레코드 수 (counter, label: vendor, category)
pub const RECORDS_SKIPPED_TOTAL: &str = "secbridge_records_skipped_total";

/// 벤더 스트림 최종 실패 수 (counter, label: vendor, category, error_kind)
pub const STREAM_FAILURES_TOTAL: &str = "secbridge_stream_failures_total";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 벤더 요청 지연 시간 히스토그램 버킷 (초)
///
/// 50ms ~ 60s 범위 (백오프 대기 제외)
pub const REQUEST_DURATION_BUCKETS: [f64; 9] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        VENDOR_REQUESTS_TOTAL,
        "Total number of vendor API requests by result"
    );
    describe_counter!(
        VENDOR_RETRIES_TOTAL,
        "Total number of retried vendor API calls"
    );
    describe_counter!(
        VENDOR_RATE_LIMITED_TOTAL,
        "Total number of 429 responses or exhausted local budgets"
    );
    describe_histogram!(
        VENDOR_REQUEST_DURATION_SECONDS,
        "Vendor API request latency in seconds"
    );
    describe_counter!(
        TOKEN_FETCHES_TOTAL,
        "Total number of token exchanges by result"
    );
    describe_counter!(
        TOKEN_INVALIDATIONS_TOTAL,
        "Total number of tokens invalidated after 401/403"
    );
    describe_counter!(
        CREDENTIAL_FETCHES_TOTAL,
        "Total number of secret store reads by result"
    );
    describe_counter!(
        EVENTS_NORMALIZED_TOTAL,
        "Total number of vendor records normalized into security events"
    );
    describe_counter!(
        RECORDS_SKIPPED_TOTAL,
        "Total number of malformed vendor records skipped"
    );
    describe_counter!(
        STREAM_FAILURES_TOTAL,
        "Total number of vendor streams terminated by an error"
    );
}
