//! 설정 관리 -- secbridge.toml 파싱 및 런타임 설정
//!
//! [`BridgeConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SECBRIDGE_CROWDSTRIKE_BASE_URL=...` 형식)
//! 3. 설정 파일 (`secbridge.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! 자격증명 값은 설정 파일에 두지 않습니다. 설정에는 비밀 저장소의 위치만
//! 기록되며, 실제 값은 런타임에 저장소에서 읽어옵니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), secbridge_core::error::BridgeError> {
//! use secbridge_core::config::BridgeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BridgeConfig::load("secbridge.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BridgeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BridgeError, ConfigError};
use crate::types::Vendor;

/// secbridge 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 클라우드 비밀 저장소 설정
    #[serde(default)]
    pub cloud: CloudConfig,
    /// 공통 HTTP / 재시도 설정
    #[serde(default)]
    pub http: HttpConfig,
    /// CrowdStrike 설정
    #[serde(default)]
    pub crowdstrike: CrowdStrikeConfig,
    /// Microsoft 설정
    #[serde(default)]
    pub microsoft: MicrosoftConfig,
    /// Proofpoint 설정
    #[serde(default)]
    pub proofpoint: ProofpointConfig,
}

impl BridgeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ReadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BridgeError> {
        toml::from_str(toml_str).map_err(|e| {
            BridgeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SECBRIDGE_{SECTION}_{FIELD}`
    /// 예: `SECBRIDGE_PROOFPOINT_ENABLED=false`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SECBRIDGE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SECBRIDGE_GENERAL_LOG_FORMAT");

        // Cloud
        override_string(&mut self.cloud.provider, "SECBRIDGE_CLOUD_PROVIDER");
        override_string(&mut self.cloud.aws_endpoint, "SECBRIDGE_CLOUD_AWS_ENDPOINT");
        override_string(
            &mut self.cloud.azure_authority,
            "SECBRIDGE_CLOUD_AZURE_AUTHORITY",
        );
        override_string(
            &mut self.cloud.azure_imds_endpoint,
            "SECBRIDGE_CLOUD_AZURE_IMDS_ENDPOINT",
        );
        override_string(&mut self.cloud.gcp_endpoint, "SECBRIDGE_CLOUD_GCP_ENDPOINT");
        override_string(
            &mut self.cloud.gcp_metadata_url,
            "SECBRIDGE_CLOUD_GCP_METADATA_URL",
        );
        override_string(
            &mut self.cloud.gcp_secret_suffix,
            "SECBRIDGE_CLOUD_GCP_SECRET_SUFFIX",
        );

        // HTTP
        override_u64(
            &mut self.http.request_timeout_secs,
            "SECBRIDGE_HTTP_REQUEST_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.http.token_timeout_secs,
            "SECBRIDGE_HTTP_TOKEN_TIMEOUT_SECS",
        );
        override_u32(&mut self.http.max_attempts, "SECBRIDGE_HTTP_MAX_ATTEMPTS");
        override_u64(
            &mut self.http.backoff_base_ms,
            "SECBRIDGE_HTTP_BACKOFF_BASE_MS",
        );
        override_u64(&mut self.http.backoff_cap_ms, "SECBRIDGE_HTTP_BACKOFF_CAP_MS");
        override_u64(
            &mut self.http.token_refresh_margin_secs,
            "SECBRIDGE_HTTP_TOKEN_REFRESH_MARGIN_SECS",
        );

        // CrowdStrike
        override_bool(
            &mut self.crowdstrike.enabled,
            "SECBRIDGE_CROWDSTRIKE_ENABLED",
        );
        override_string(
            &mut self.crowdstrike.base_url,
            "SECBRIDGE_CROWDSTRIKE_BASE_URL",
        );
        override_usize(
            &mut self.crowdstrike.max_page_size,
            "SECBRIDGE_CROWDSTRIKE_MAX_PAGE_SIZE",
        );
        override_u32(
            &mut self.crowdstrike.rate_limit.calls,
            "SECBRIDGE_CROWDSTRIKE_RATE_LIMIT_CALLS",
        );

        // Microsoft
        override_bool(&mut self.microsoft.enabled, "SECBRIDGE_MICROSOFT_ENABLED");
        override_string(
            &mut self.microsoft.authority,
            "SECBRIDGE_MICROSOFT_AUTHORITY",
        );
        override_string(
            &mut self.microsoft.graph_base_url,
            "SECBRIDGE_MICROSOFT_GRAPH_BASE_URL",
        );
        override_usize(
            &mut self.microsoft.max_page_size,
            "SECBRIDGE_MICROSOFT_MAX_PAGE_SIZE",
        );
        override_u32(
            &mut self.microsoft.rate_limit.calls,
            "SECBRIDGE_MICROSOFT_RATE_LIMIT_CALLS",
        );

        // Proofpoint
        override_bool(&mut self.proofpoint.enabled, "SECBRIDGE_PROOFPOINT_ENABLED");
        override_string(
            &mut self.proofpoint.base_url,
            "SECBRIDGE_PROOFPOINT_BASE_URL",
        );
        override_string(
            &mut self.proofpoint.session_path,
            "SECBRIDGE_PROOFPOINT_SESSION_PATH",
        );
        override_u64(
            &mut self.proofpoint.max_window_secs,
            "SECBRIDGE_PROOFPOINT_MAX_WINDOW_SECS",
        );
        override_u64(
            &mut self.proofpoint.max_lookback_secs,
            "SECBRIDGE_PROOFPOINT_MAX_LOOKBACK_SECS",
        );
        override_u32(
            &mut self.proofpoint.rate_limit.calls,
            "SECBRIDGE_PROOFPOINT_RATE_LIMIT_CALLS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BridgeError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // provider 검증
        let valid_providers = ["auto", "aws", "azure", "gcp"];
        if !valid_providers.contains(&self.cloud.provider.as_str()) {
            return Err(invalid(
                "cloud.provider",
                format!("must be one of: {}", valid_providers.join(", ")),
            ));
        }

        // HTTP / 재시도 검증
        if self.http.request_timeout_secs == 0 || self.http.request_timeout_secs > 600 {
            return Err(invalid(
                "http.request_timeout_secs",
                "must be between 1 and 600".to_owned(),
            ));
        }
        if self.http.token_timeout_secs == 0 || self.http.token_timeout_secs > 120 {
            return Err(invalid(
                "http.token_timeout_secs",
                "must be between 1 and 120".to_owned(),
            ));
        }
        if self.http.max_attempts == 0 || self.http.max_attempts > 10 {
            return Err(invalid(
                "http.max_attempts",
                "must be between 1 and 10".to_owned(),
            ));
        }
        if self.http.backoff_base_ms == 0 || self.http.backoff_base_ms > self.http.backoff_cap_ms
        {
            return Err(invalid(
                "http.backoff_base_ms",
                "must be non-zero and not greater than http.backoff_cap_ms".to_owned(),
            ));
        }

        // 벤더별 검증
        if !Vendor::ALL.iter().any(|v| self.vendor_enabled(*v)) {
            return Err(invalid(
                "vendors",
                "at least one vendor must be enabled".to_owned(),
            ));
        }

        if self.crowdstrike.enabled {
            validate_url("crowdstrike.base_url", &self.crowdstrike.base_url)?;
            validate_page_size("crowdstrike.max_page_size", self.crowdstrike.max_page_size, 5000)?;
            self.crowdstrike.rate_limit.validate("crowdstrike.rate_limit")?;
        }

        if self.microsoft.enabled {
            validate_url("microsoft.authority", &self.microsoft.authority)?;
            validate_url("microsoft.graph_base_url", &self.microsoft.graph_base_url)?;
            validate_page_size("microsoft.max_page_size", self.microsoft.max_page_size, 999)?;
            self.microsoft.rate_limit.validate("microsoft.rate_limit")?;
            for (field, scope) in [
                ("microsoft.alerts_scope", &self.microsoft.alerts_scope),
                ("microsoft.identity_scope", &self.microsoft.identity_scope),
                ("microsoft.compliance_scope", &self.microsoft.compliance_scope),
            ] {
                if scope.is_empty() {
                    return Err(invalid(field, "scope must not be empty".to_owned()));
                }
            }
        }

        if self.proofpoint.enabled {
            validate_url("proofpoint.base_url", &self.proofpoint.base_url)?;
            self.proofpoint.rate_limit.validate("proofpoint.rate_limit")?;
            if self.proofpoint.max_window_secs == 0 {
                return Err(invalid(
                    "proofpoint.max_window_secs",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.proofpoint.max_lookback_secs < self.proofpoint.max_window_secs {
                return Err(invalid(
                    "proofpoint.max_lookback_secs",
                    "must not be smaller than proofpoint.max_window_secs".to_owned(),
                ));
            }
            if self.proofpoint.default_lookback_secs == 0
                || self.proofpoint.default_lookback_secs > self.proofpoint.max_lookback_secs
            {
                return Err(invalid(
                    "proofpoint.default_lookback_secs",
                    "must be between 1 and proofpoint.max_lookback_secs".to_owned(),
                ));
            }
            if self.proofpoint.session_lifetime_secs <= self.http.token_refresh_margin_secs {
                return Err(invalid(
                    "proofpoint.session_lifetime_secs",
                    "must be longer than http.token_refresh_margin_secs".to_owned(),
                ));
            }
        }

        Ok(())
    }

    /// 벤더가 활성화되었는지 확인합니다.
    pub fn vendor_enabled(&self, vendor: Vendor) -> bool {
        match vendor {
            Vendor::CrowdStrike => self.crowdstrike.enabled,
            Vendor::Microsoft => self.microsoft.enabled,
            Vendor::Proofpoint => self.proofpoint.enabled,
        }
    }

    /// 벤더의 요청 한도 설정
    pub fn rate_limit(&self, vendor: Vendor) -> &RateLimitConfig {
        match vendor {
            Vendor::CrowdStrike => &self.crowdstrike.rate_limit,
            Vendor::Microsoft => &self.microsoft.rate_limit,
            Vendor::Proofpoint => &self.proofpoint.rate_limit,
        }
    }
}

fn invalid(field: &str, reason: String) -> BridgeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn validate_url(field: &str, value: &str) -> Result<(), BridgeError> {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(invalid(field, "must be an http(s) URL".to_owned()));
    }
    Ok(())
}

fn validate_page_size(field: &str, value: usize, max: usize) -> Result<(), BridgeError> {
    if value == 0 || value > max {
        return Err(invalid(field, format!("must be between 1 and {max}")));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 클라우드 비밀 저장소 설정
///
/// 빈 문자열 필드는 배포 마커(환경변수)나 기본 엔드포인트로 채워집니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// 클라우드 선택 (auto, aws, azure, gcp). `auto`는 배포 마커로 감지합니다.
    pub provider: String,
    /// AWS Secrets Manager 엔드포인트 (비어 있으면 리전 기본값)
    pub aws_endpoint: String,
    /// Azure AD 토큰 발급 authority
    pub azure_authority: String,
    /// Azure 관리 ID(IMDS) 토큰 엔드포인트
    pub azure_imds_endpoint: String,
    /// GCP Secret Manager 엔드포인트
    pub gcp_endpoint: String,
    /// GCP 메타데이터 서버 토큰 URL
    pub gcp_metadata_url: String,
    /// GCP 비밀 이름 접미사
    pub gcp_secret_suffix: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_owned(),
            aws_endpoint: String::new(),
            azure_authority: "https://login.microsoftonline.com".to_owned(),
            azure_imds_endpoint: "http://169.254.169.254/metadata/identity/oauth2/token"
                .to_owned(),
            gcp_endpoint: "https://secretmanager.googleapis.com".to_owned(),
            gcp_metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".to_owned(),
            gcp_secret_suffix: "-prod".to_owned(),
        }
    }
}

/// 공통 HTTP / 재시도 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// 데이터 요청 기본 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 토큰 교환 타임아웃 (초)
    pub token_timeout_secs: u64,
    /// 재시도를 포함한 최대 시도 횟수
    pub max_attempts: u32,
    /// 지수 백오프 기본 지연 (밀리초)
    pub backoff_base_ms: u64,
    /// 지수 백오프 최대 지연 (밀리초)
    pub backoff_cap_ms: u64,
    /// 토큰 만료 전 갱신 여유 (초)
    pub token_refresh_margin_secs: u64,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            token_timeout_secs: 15,
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
            token_refresh_margin_secs: 60,
        }
    }
}

/// 벤더 요청 한도 (윈도우당 호출 수)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 윈도우당 허용 호출 수
    pub calls: u32,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self, field: &str) -> Result<(), BridgeError> {
        if self.calls == 0 {
            return Err(invalid(&format!("{field}.calls"), "must be greater than 0".to_owned()));
        }
        if self.window_secs == 0 {
            return Err(invalid(
                &format!("{field}.window_secs"),
                "must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// CrowdStrike Falcon 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdStrikeConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// API 기본 URL (리전별로 다름)
    pub base_url: String,
    /// 페이지당 최대 레코드 수
    pub max_page_size: usize,
    /// 요청 한도
    pub rate_limit: RateLimitConfig,
}

impl Default for CrowdStrikeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.crowdstrike.com".to_owned(),
            max_page_size: 500,
            rate_limit: RateLimitConfig {
                calls: 6000,
                window_secs: 60,
            },
        }
    }
}

/// Microsoft Defender / Entra ID / Purview 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrosoftConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 토큰 발급 authority
    pub authority: String,
    /// Graph API 기본 URL. 다음 페이지 링크는 이 호스트에 있어야 합니다.
    pub graph_base_url: String,
    /// 보안 알림 토큰 scope
    pub alerts_scope: String,
    /// 아이덴티티 위험 토큰 scope
    pub identity_scope: String,
    /// 컴플라이언스(Purview) 토큰 scope
    pub compliance_scope: String,
    /// 페이지당 최대 레코드 수 (`$top`)
    pub max_page_size: usize,
    /// 요청 한도
    pub rate_limit: RateLimitConfig,
}

impl Default for MicrosoftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authority: "https://login.microsoftonline.com".to_owned(),
            graph_base_url: "https://graph.microsoft.com".to_owned(),
            alerts_scope: "https://graph.microsoft.com/.default".to_owned(),
            identity_scope: "https://graph.microsoft.com/.default".to_owned(),
            compliance_scope: "https://graph.microsoft.com/.default".to_owned(),
            max_page_size: 100,
            rate_limit: RateLimitConfig {
                calls: 100,
                window_secs: 60,
            },
        }
    }
}

/// Proofpoint TAP 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofpointConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// API 기본 URL
    pub base_url: String,
    /// 세션 발급 경로. 비어 있으면 자격증명 쌍으로 Basic 세션을 구성합니다.
    pub session_path: String,
    /// 세션 토큰 수명 (초). 세션 응답에 만료가 없을 때 사용합니다.
    pub session_lifetime_secs: u64,
    /// 쿼리당 최대 시간 윈도우 (초)
    pub max_window_secs: u64,
    /// 최대 조회 가능 과거 범위 (초)
    pub max_lookback_secs: u64,
    /// 필터에 시작 시각이 없을 때의 조회 범위 (초)
    pub default_lookback_secs: u64,
    /// 요청 한도
    pub rate_limit: RateLimitConfig,
}

impl Default for ProofpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://tap-api-v2.proofpoint.com".to_owned(),
            session_path: String::new(),
            session_lifetime_secs: 3600,
            max_window_secs: 3600,
            max_lookback_secs: 7 * 24 * 3600,
            default_lookback_secs: 3600,
            rate_limit: RateLimitConfig {
                calls: 1800,
                window_secs: 86_400,
            },
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
