//! 토큰 캐시 -- 벤더 토큰 수명 관리
//!
//! 토큰 키(벤더 또는 `벤더/서브 서비스`)마다 하나의 슬롯을 관리합니다.
//!
//! ```text
//! Empty --get_token--> Fetching --성공--> Valid --만료 마진 경과--> Expiring
//!   ^                     |                 |                        |
//!   +------실패/취소------+                 +------invalidate--------+--> Empty
//! ```
//!
//! 같은 키에 대한 동시 요청은 진행 중인 하나의 교환을 `watch` 채널로
//! 공유합니다 (single-flight). 교환은 항상 `CredentialBroker`에서
//! 자격증명을 받아 `RateLimiter`를 거쳐 실행됩니다.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secbridge_core::config::HttpConfig;
use secbridge_core::credential::Credential;
use secbridge_core::error::BridgeError;
use secbridge_core::metrics as m;
use secbridge_core::types::TokenKey;
use secbridge_credentials::{AnySecretStore, CredentialBroker, SecretStore};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::rate_limit::{CallOutcome, Operation, RateLimiter};

const TOKEN_EXCHANGE: Operation = Operation::idempotent("token-exchange");

/// Longest lifetime honoured for an issued token; longer `expires_in`
/// values are refreshed as if they were this long.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(86_400);

/// How a token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Basic,
}

/// A token issued by a vendor's token or session endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    scheme: AuthScheme,
    lifetime: Duration,
}

impl AccessToken {
    pub fn bearer(value: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            scheme: AuthScheme::Bearer,
            lifetime,
        }
    }

    pub fn basic(value: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            scheme: AuthScheme::Basic,
            lifetime,
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// `Authorization` header value.
    pub fn header_value(&self) -> String {
        match self.scheme {
            AuthScheme::Bearer => format!("Bearer {}", self.value),
            AuthScheme::Basic => format!("Basic {}", self.value),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("scheme", &self.scheme)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

/// A token together with its margin-adjusted expiry.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub key: TokenKey,
    pub token: AccessToken,
    pub issued_at: Instant,
    /// `issued_at + min(lifetime, 1 day) - margin`
    pub expires_at: Instant,
}

/// Turns a vendor credential into an access token.
///
/// Each vendor implements its own exchange (OAuth2 client credentials,
/// session login). The cache runs it through the rate limiter, so the
/// exchange reports its HTTP outcome as a [`CallOutcome`]. A rejected
/// credential (400/401/403) must be reported as
/// `CallOutcome::Failed(BridgeError::AuthenticationFailed)`.
pub trait TokenExchange: Send + Sync {
    fn exchange(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = CallOutcome<AccessToken>> + Send;
}

/// Observable slot state for one token key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Empty,
    Fetching,
    Valid,
    /// Cached but past the margin-adjusted expiry; the next request refreshes.
    Expiring,
}

type SharedResult = Option<Result<AccessToken, BridgeError>>;

enum Slot {
    Fetching {
        generation: u64,
        rx: watch::Receiver<SharedResult>,
    },
    Ready(CachedToken),
}

enum Action {
    Ready(AccessToken),
    Wait(watch::Receiver<SharedResult>),
    Lead(u64, watch::Sender<SharedResult>),
}

/// Per-key, single-flight token cache.
pub struct TokenCache<S: SecretStore = AnySecretStore> {
    broker: Arc<CredentialBroker<S>>,
    limiter: Arc<RateLimiter>,
    margin: Duration,
    fetch_timeout: Duration,
    slots: Mutex<HashMap<TokenKey, Slot>>,
    generation: AtomicU64,
}

impl<S: SecretStore> TokenCache<S> {
    pub fn new(
        broker: Arc<CredentialBroker<S>>,
        limiter: Arc<RateLimiter>,
        margin: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            limiter,
            margin,
            fetch_timeout,
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Margin and fetch timeout from `[http]`.
    pub fn from_config(
        http: &HttpConfig,
        broker: Arc<CredentialBroker<S>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::new(
            broker,
            limiter,
            http.token_refresh_margin(),
            http.token_timeout(),
        )
    }

    pub fn broker(&self) -> &Arc<CredentialBroker<S>> {
        &self.broker
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<TokenKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, key: &TokenKey) -> TokenState {
        match self.slots().get(key) {
            None => TokenState::Empty,
            Some(Slot::Fetching { .. }) => TokenState::Fetching,
            Some(Slot::Ready(cached)) if Instant::now() < cached.expires_at => TokenState::Valid,
            Some(Slot::Ready(_)) => TokenState::Expiring,
        }
    }

    /// 유효한 토큰을 반환합니다. 필요하면 교환을 한 번만 실행합니다.
    ///
    /// 같은 키로 동시에 들어온 요청은 진행 중인 교환의 결과를 공유합니다.
    /// 교환이 타임아웃되거나 교환 중인 태스크가 취소되면 슬롯은 `Empty`로
    /// 돌아가고 대기자는 다시 시도합니다.
    ///
    /// # Errors
    ///
    /// - `BridgeError::AuthenticationFailed`: 자격증명 거부, 또는 토큰 수명이
    ///   갱신 마진보다 짧음
    /// - `BridgeError::Timeout`: 토큰 타임아웃 초과
    /// - 브로커 / 레이트 리미터 에러 전파
    pub async fn get_token<E: TokenExchange>(
        &self,
        key: &TokenKey,
        exchange: &E,
    ) -> Result<AccessToken, BridgeError> {
        loop {
            match self.next_action(key) {
                Action::Ready(token) => return Ok(token),
                Action::Wait(mut rx) => {
                    debug!(token_key = %key, "waiting for in-flight token fetch");
                    let shared = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    match shared {
                        Some(result) => return result,
                        // 선행 교환이 결과 없이 끝남 (타임아웃/취소) → 재시도
                        None => continue,
                    }
                }
                Action::Lead(generation, tx) => {
                    let guard = SlotGuard {
                        slots: &self.slots,
                        key,
                        generation,
                        armed: true,
                    };
                    let result = self.fetch(key, exchange).await;

                    {
                        let mut slots = self.slots();
                        let current = matches!(
                            slots.get(key),
                            Some(Slot::Fetching { generation: g, .. }) if *g == generation
                        );
                        if current {
                            match &result {
                                Ok(cached) => {
                                    slots.insert(key.clone(), Slot::Ready(cached.clone()));
                                }
                                Err(_) => {
                                    slots.remove(key);
                                }
                            }
                        }
                    }
                    guard.disarm();

                    let result = result.map(|cached| cached.token);
                    if !matches!(result, Err(BridgeError::Timeout { .. })) {
                        tx.send_replace(Some(result.clone()));
                    }
                    return result;
                }
            }
        }
    }

    fn next_action(&self, key: &TokenKey) -> Action {
        let mut slots = self.slots();
        let existing = match slots.get(key) {
            Some(Slot::Ready(cached)) if Instant::now() < cached.expires_at => {
                Some(Action::Ready(cached.token.clone()))
            }
            Some(Slot::Fetching { rx, .. }) => Some(Action::Wait(rx.clone())),
            _ => None,
        };
        if let Some(action) = existing {
            return action;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        slots.insert(key.clone(), Slot::Fetching { generation, rx });
        Action::Lead(generation, tx)
    }

    async fn fetch<E: TokenExchange>(
        &self,
        key: &TokenKey,
        exchange: &E,
    ) -> Result<CachedToken, BridgeError> {
        let vendor = key.vendor;
        let started = Instant::now();

        let attempt = async {
            let owned = self.broker.resolve(vendor).await?;
            let credential: &Credential = &owned;
            self.limiter
                .execute(vendor, TOKEN_EXCHANGE, move || exchange.exchange(credential))
                .await
        };

        let result = match tokio::time::timeout(self.fetch_timeout, attempt).await {
            Ok(Ok(token)) if token.lifetime() <= self.margin => {
                Err(BridgeError::AuthenticationFailed {
                    vendor,
                    reason: format!(
                        "token lifetime {}s is not longer than the {}s refresh margin",
                        token.lifetime().as_secs(),
                        self.margin.as_secs()
                    ),
                })
            }
            Ok(result) => result,
            Err(_elapsed) => Err(BridgeError::Timeout {
                vendor,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(token) => {
                metrics::counter!(
                    m::TOKEN_FETCHES_TOTAL,
                    m::LABEL_VENDOR => vendor.as_str(),
                    m::LABEL_RESULT => "success"
                )
                .increment(1);
                let issued_at = Instant::now();
                let usable = token
                    .lifetime()
                    .min(MAX_TOKEN_LIFETIME)
                    .saturating_sub(self.margin);
                let expires_at = issued_at.checked_add(usable).unwrap_or(issued_at);
                info!(
                    token_key = %key,
                    lifetime_secs = token.lifetime().as_secs(),
                    "token issued"
                );
                Ok(CachedToken {
                    key: key.clone(),
                    token,
                    issued_at,
                    expires_at,
                })
            }
            Err(e) => {
                metrics::counter!(
                    m::TOKEN_FETCHES_TOTAL,
                    m::LABEL_VENDOR => vendor.as_str(),
                    m::LABEL_RESULT => "failure"
                )
                .increment(1);
                warn!(token_key = %key, error = %e, "token fetch failed");
                Err(e)
            }
        }
    }

    /// 토큰과 벤더 자격증명 캐시를 함께 비웁니다.
    ///
    /// 401/403 응답 후 호출되며, 다음 요청은 비밀 저장소부터 다시 읽습니다.
    /// 진행 중인 교환은 건드리지 않습니다.
    pub async fn invalidate(&self, key: &TokenKey) {
        let removed = {
            let mut slots = self.slots();
            if matches!(slots.get(key), Some(Slot::Ready(_))) {
                slots.remove(key).is_some()
            } else {
                false
            }
        };

        if removed {
            metrics::counter!(
                m::TOKEN_INVALIDATIONS_TOTAL,
                m::LABEL_VENDOR => key.vendor.as_str()
            )
            .increment(1);
            info!(token_key = %key, "token invalidated");
        }
        self.broker.invalidate(key.vendor).await;
    }
}

/// Returns an abandoned `Fetching` slot to `Empty`.
struct SlotGuard<'a> {
    slots: &'a Mutex<HashMap<TokenKey, Slot>>,
    key: &'a TokenKey,
    generation: u64,
    armed: bool,
}

impl SlotGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let current = matches!(
            slots.get(self.key),
            Some(Slot::Fetching { generation, .. }) if *generation == self.generation
        );
        if current {
            slots.remove(self.key);
            debug!(token_key = %self.key, "abandoned token fetch, slot reset");
        }
    }
}
