//! Per-vendor rate limiting and retry.
//!
//! Every outbound vendor call (token exchanges included) runs through
//! [`RateLimiter::execute`]. The limiter keeps one token bucket per vendor,
//! decrements it before each attempt, reconciles it with whatever rate-limit
//! headers the vendor sends back, and retries 429 / 5xx outcomes of
//! idempotent operations with capped exponential backoff.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use secbridge_core::config::{BridgeConfig, HttpConfig, RateLimitConfig};
use secbridge_core::error::BridgeError;
use secbridge_core::metrics as m;
use secbridge_core::types::Vendor;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Epoch-seconds values above this are absolute timestamps, not deltas.
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// Longest window reset or `Retry-After` a vendor can push a bucket out by.
const MAX_RESET_HINT: Duration = Duration::from_secs(86_400);

/// `now + after`, saturating at [`MAX_RESET_HINT`] instead of overflowing.
fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(MAX_RESET_HINT))
        .unwrap_or(now)
}

/// Whether an operation may be repeated without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
    Idempotent,
    NonIdempotent,
}

/// A named logical operation, used for retry policy and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub idempotency: Idempotency,
}

impl Operation {
    pub const fn idempotent(name: &'static str) -> Self {
        Self {
            name,
            idempotency: Idempotency::Idempotent,
        }
    }

    pub const fn non_idempotent(name: &'static str) -> Self {
        Self {
            name,
            idempotency: Idempotency::NonIdempotent,
        }
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotency == Idempotency::Idempotent
    }
}

/// Rate-limit hints carried by a vendor response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u32>,
    /// `X-RateLimit-Reset`, as a delay from now
    pub reset_after: Option<Duration>,
    /// `Retry-After`
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        Self::parse(
            |name| headers.get(name).and_then(|v| v.to_str().ok()),
            Utc::now(),
        )
    }

    /// 헤더 조회 함수로부터 파싱합니다.
    ///
    /// `X-RateLimit-Reset`은 epoch 초(절대 시각) 또는 남은 초(상대 값)를 모두
    /// 허용하고, `Retry-After`는 초 단위 정수 또는 HTTP-date를 허용합니다.
    pub fn parse<'a>(lookup: impl Fn(&str) -> Option<&'a str>, now: DateTime<Utc>) -> Self {
        let remaining = lookup("x-ratelimit-remaining").and_then(|v| v.trim().parse().ok());

        let reset_after = lookup("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|value| {
                let secs = if value > EPOCH_THRESHOLD {
                    value - now.timestamp()
                } else {
                    value
                };
                Duration::from_secs(u64::try_from(secs).unwrap_or(0))
            });

        let retry_after = lookup("retry-after").and_then(|v| {
            let v = v.trim();
            match v.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => DateTime::parse_from_rfc2822(v).ok().map(|at| {
                    let secs = at.with_timezone(&Utc).timestamp() - now.timestamp();
                    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
                }),
            }
        });

        Self {
            remaining,
            reset_after,
            retry_after,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset_after.is_none() && self.retry_after.is_none()
    }
}

/// What a single attempt produced, as seen by the limiter.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// The call completed; the value is returned to the caller.
    Done(T, RateLimitHeaders),
    /// HTTP 429.
    Throttled(RateLimitHeaders),
    /// HTTP 5xx.
    ServerError(u16, RateLimitHeaders),
    /// Anything that must not be retried.
    Failed(BridgeError),
}

/// Exponential backoff with jitter.
///
/// The n-th retry waits around `base * 2^(n-1)`, never more than `cap`.
/// `cap` also bounds how long the limiter is willing to wait for a window
/// reset or a `Retry-After` before giving up with `RateLimited`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(http: &HttpConfig) -> Self {
        Self {
            base: Duration::from_millis(http.backoff_base_ms),
            cap: Duration::from_millis(http.backoff_cap_ms),
            max_attempts: http.max_attempts.max(1),
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }

    /// `delay(retry)` with equal jitter: somewhere in `[delay/2, delay]`.
    pub fn jittered(&self, retry: u32) -> Duration {
        let delay = self.delay(retry);
        let half = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=half);
        Duration::from_millis(half.saturating_add(jitter))
    }
}

/// Read-only view of one vendor's bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub vendor: Vendor,
    pub remaining: u32,
    pub reset_in: Duration,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Bucket {
    capacity: u32,
    window: Duration,
    remaining: u32,
    reset_at: Instant,
    consecutive_failures: u32,
}

impl Bucket {
    fn new(limit: &RateLimitConfig) -> Self {
        Self {
            capacity: limit.calls,
            window: limit.window(),
            remaining: limit.calls,
            reset_at: deadline(Instant::now(), limit.window()),
            consecutive_failures: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now >= self.reset_at {
            self.remaining = self.capacity;
            self.reset_at = deadline(now, self.window);
        }
    }
}

/// Shared, vendor-parameterized throttling and retry primitive.
///
/// Buckets are independent: a drained CrowdStrike budget never delays a
/// Microsoft call.
#[derive(Debug)]
pub struct RateLimiter {
    policy: BackoffPolicy,
    buckets: HashMap<Vendor, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(
        policy: BackoffPolicy,
        limits: impl IntoIterator<Item = (Vendor, RateLimitConfig)>,
    ) -> Self {
        let buckets = limits
            .into_iter()
            .map(|(vendor, limit)| (vendor, Mutex::new(Bucket::new(&limit))))
            .collect();
        Self { policy, buckets }
    }

    /// One bucket per vendor from `[crowdstrike|microsoft|proofpoint].rate_limit`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            BackoffPolicy::from_config(&config.http),
            Vendor::ALL.map(|v| (v, config.rate_limit(v).clone())),
        )
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Snapshot of the vendor's bucket, `None` when the vendor is unlimited.
    pub async fn state(&self, vendor: Vendor) -> Option<RateLimitState> {
        let bucket = self.buckets.get(&vendor)?;
        let mut bucket = bucket.lock().await;
        let now = Instant::now();
        bucket.refill(now);
        Some(RateLimitState {
            vendor,
            remaining: bucket.remaining,
            reset_in: bucket.reset_at.saturating_duration_since(now),
            consecutive_failures: bucket.consecutive_failures,
        })
    }

    /// 벤더 호출을 한도 계산과 재시도 정책 아래에서 실행합니다.
    ///
    /// `call`은 시도마다 한 번씩 호출됩니다. 멱등 연산만 재시도되며,
    /// 비멱등 연산은 정확히 한 번 실행됩니다.
    ///
    /// # Errors
    ///
    /// - `BridgeError::RateLimited`: 429가 계속되었거나, 예산 리셋이
    ///   백오프 상한보다 멀리 있음
    /// - `BridgeError::Exhausted`: 5xx가 최대 시도 횟수까지 반복됨
    /// - `BridgeError::Upstream`: 비멱등 연산이 5xx를 받음
    /// - `call`이 `CallOutcome::Failed`로 돌려준 에러
    pub async fn execute<T, F, Fut>(
        &self,
        vendor: Vendor,
        operation: Operation,
        mut call: F,
    ) -> Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let max_attempts = if operation.is_idempotent() {
            self.policy.max_attempts
        } else {
            1
        };

        let mut attempts = 0;
        let mut last_status: Option<u16> = None;
        let mut last_retry_after: Option<Duration> = None;

        while attempts < max_attempts {
            if attempts > 0 {
                let backoff = self
                    .policy
                    .jittered(attempts)
                    .max(last_retry_after.unwrap_or_default());
                if backoff > self.policy.cap {
                    debug!(
                        vendor = %vendor,
                        operation = operation.name,
                        retry_after_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "retry-after beyond backoff cap, giving up"
                    );
                    break;
                }
                warn!(
                    vendor = %vendor,
                    operation = operation.name,
                    attempt = attempts + 1,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying vendor call"
                );
                metrics::counter!(
                    m::VENDOR_RETRIES_TOTAL,
                    m::LABEL_VENDOR => vendor.as_str()
                )
                .increment(1);
                tokio::time::sleep(backoff).await;
            }

            self.acquire(vendor).await?;
            attempts += 1;

            match call().await {
                CallOutcome::Done(value, headers) => {
                    self.settle(vendor, &headers, true).await;
                    return Ok(value);
                }
                CallOutcome::Throttled(headers) => {
                    metrics::counter!(
                        m::VENDOR_RATE_LIMITED_TOTAL,
                        m::LABEL_VENDOR => vendor.as_str()
                    )
                    .increment(1);
                    self.settle(vendor, &headers, false).await;
                    last_status = Some(429);
                    last_retry_after = headers.retry_after;
                    if last_retry_after.is_some_and(|d| d > self.policy.cap) {
                        debug!(
                            vendor = %vendor,
                            operation = operation.name,
                            "retry-after beyond backoff cap, giving up"
                        );
                        break;
                    }
                }
                CallOutcome::ServerError(status, headers) => {
                    self.settle(vendor, &headers, false).await;
                    last_status = Some(status);
                    last_retry_after = headers.retry_after;
                }
                CallOutcome::Failed(err) => return Err(err),
            }
        }

        match last_status {
            Some(429) => Err(BridgeError::RateLimited {
                vendor,
                retry_after: last_retry_after,
            }),
            Some(status) if !operation.is_idempotent() => Err(BridgeError::Upstream {
                vendor,
                status,
                reason: format!("{} is not retried", operation.name),
            }),
            _ => Err(BridgeError::Exhausted {
                vendor,
                attempts,
                last_status,
            }),
        }
    }

    /// Takes one unit of budget, waiting for the window reset when it is
    /// within the backoff cap.
    async fn acquire(&self, vendor: Vendor) -> Result<(), BridgeError> {
        let Some(bucket) = self.buckets.get(&vendor) else {
            return Ok(());
        };

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                let now = Instant::now();
                bucket.refill(now);
                if bucket.remaining > 0 {
                    bucket.remaining -= 1;
                    return Ok(());
                }
                bucket.reset_at.saturating_duration_since(now)
            };

            if wait > self.policy.cap {
                metrics::counter!(
                    m::VENDOR_RATE_LIMITED_TOTAL,
                    m::LABEL_VENDOR => vendor.as_str()
                )
                .increment(1);
                warn!(
                    vendor = %vendor,
                    reset_in_secs = wait.as_secs(),
                    "local rate budget exhausted"
                );
                return Err(BridgeError::RateLimited {
                    vendor,
                    retry_after: Some(wait),
                });
            }

            debug!(
                vendor = %vendor,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate budget empty, waiting for window reset"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Post-call accounting against the vendor's own view of the budget.
    ///
    /// Reset and retry hints are clamped to [`MAX_RESET_HINT`].
    async fn settle(&self, vendor: Vendor, headers: &RateLimitHeaders, success: bool) {
        let Some(bucket) = self.buckets.get(&vendor) else {
            return;
        };
        let mut bucket = bucket.lock().await;
        let now = Instant::now();

        if let Some(remaining) = headers.remaining {
            bucket.remaining = remaining.min(bucket.capacity);
        }
        if let Some(reset_after) = headers.reset_after {
            bucket.reset_at = deadline(now, reset_after.min(MAX_RESET_HINT));
        }

        if success {
            bucket.consecutive_failures = 0;
        } else {
            bucket.consecutive_failures = bucket.consecutive_failures.saturating_add(1);
            if let Some(retry_after) = headers.retry_after {
                bucket.remaining = 0;
                bucket.reset_at = deadline(now, retry_after.min(MAX_RESET_HINT));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter(calls: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            BackoffPolicy {
                base: Duration::from_millis(100),
                cap: Duration::from_secs(30),
                max_attempts: 5,
            },
            [(
                Vendor::CrowdStrike,
                RateLimitConfig { calls, window_secs },
            )],
        )
    }

    const LIST: Operation = Operation::idempotent("list-detections");

    #[tokio::test(start_paused = true)]
    async fn idempotent_server_errors_exhaust_after_max_attempts() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CallOutcome::<()>::ServerError(503, RateLimitHeaders::default())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(
            err,
            BridgeError::Exhausted {
                attempts: 5,
                last_status: Some(503),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn non_idempotent_operation_runs_exactly_once() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute(
                Vendor::CrowdStrike,
                Operation::non_idempotent("contain-host"),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CallOutcome::<()>::ServerError(500, RateLimitHeaders::default())
                },
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BridgeError::Upstream { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_then_success_is_retried() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let value = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    CallOutcome::Throttled(RateLimitHeaders {
                        retry_after: Some(Duration::from_secs(2)),
                        ..Default::default()
                    })
                } else {
                    CallOutcome::Done(42, RateLimitHeaders::default())
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let state = limiter.state(Vendor::CrowdStrike).await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_throttling_is_rate_limited() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CallOutcome::<()>::Throttled(RateLimitHeaders {
                    retry_after: Some(Duration::from_secs(1)),
                    ..Default::default()
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), limiter.policy().max_attempts);

        assert!(matches!(
            err,
            BridgeError::RateLimited {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(1)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_beyond_cap_gives_up_early() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CallOutcome::<()>::Throttled(RateLimitHeaders {
                    retry_after: Some(Duration::from_secs(120)),
                    ..Default::default()
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BridgeError::RateLimited { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_after_is_clamped_not_overflowed() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);
        let headers = RateLimitHeaders::parse(
            |name| (name == "retry-after").then_some("18446744073709551615"),
            Utc::now(),
        );
        assert_eq!(headers.retry_after, Some(Duration::from_secs(u64::MAX)));

        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CallOutcome::<()>::Throttled(headers)
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BridgeError::RateLimited { .. }));
        let state = limiter.state(Vendor::CrowdStrike).await.unwrap();
        assert_eq!(state.remaining, 0);
        assert!(state.reset_in <= MAX_RESET_HINT);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_reset_header_is_clamped() {
        let limiter = limiter(100, 60);

        limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                CallOutcome::Done(
                    (),
                    RateLimitHeaders {
                        remaining: Some(3),
                        reset_after: Some(Duration::MAX),
                        retry_after: None,
                    },
                )
            })
            .await
            .unwrap();

        let state = limiter.state(Vendor::CrowdStrike).await.unwrap();
        assert_eq!(state.remaining, 3);
        assert!(state.reset_in <= MAX_RESET_HINT);
    }

    #[test]
    fn deadline_saturates() {
        let now = Instant::now();
        assert_eq!(deadline(now, Duration::from_secs(5)), now + Duration::from_secs(5));
        assert!(deadline(now, Duration::MAX) <= now + MAX_RESET_HINT);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_outcome_is_not_retried() {
        let limiter = limiter(100, 60);
        let calls = AtomicU32::new(0);

        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CallOutcome::<()>::Failed(BridgeError::Upstream {
                    vendor: Vendor::CrowdStrike,
                    status: 400,
                    reason: "bad filter".to_owned(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BridgeError::Upstream { status: 400, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_budget_waits_for_window_reset() {
        let limiter = limiter(2, 10);
        let started = Instant::now();

        for _ in 0..3 {
            limiter
                .execute(Vendor::CrowdStrike, LIST, || async {
                    CallOutcome::Done((), RateLimitHeaders::default())
                })
                .await
                .unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_budget_with_distant_reset_is_rate_limited() {
        let limiter = limiter(1, 3600);
        let ok = || async { CallOutcome::Done((), RateLimitHeaders::default()) };

        limiter.execute(Vendor::CrowdStrike, LIST, ok).await.unwrap();
        let err = limiter
            .execute(Vendor::CrowdStrike, LIST, ok)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BridgeError::RateLimited {
                retry_after: Some(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn headers_reconcile_bucket() {
        let limiter = limiter(100, 60);

        limiter
            .execute(Vendor::CrowdStrike, LIST, || async {
                CallOutcome::Done(
                    (),
                    RateLimitHeaders {
                        remaining: Some(7),
                        reset_after: Some(Duration::from_secs(5)),
                        retry_after: None,
                    },
                )
            })
            .await
            .unwrap();

        let state = limiter.state(Vendor::CrowdStrike).await.unwrap();
        assert_eq!(state.remaining, 7);
        assert!(state.reset_in <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn vendors_have_independent_buckets() {
        let limiter = RateLimiter::new(
            BackoffPolicy::default(),
            [
                (
                    Vendor::CrowdStrike,
                    RateLimitConfig {
                        calls: 1,
                        window_secs: 3600,
                    },
                ),
                (
                    Vendor::Microsoft,
                    RateLimitConfig {
                        calls: 10,
                        window_secs: 60,
                    },
                ),
            ],
        );
        let ok = || async { CallOutcome::Done((), RateLimitHeaders::default()) };

        limiter.execute(Vendor::CrowdStrike, LIST, ok).await.unwrap();
        assert!(limiter.execute(Vendor::CrowdStrike, LIST, ok).await.is_err());
        limiter.execute(Vendor::Microsoft, LIST, ok).await.unwrap();
        // 버킷이 없는 벤더는 제한 없음
        limiter.execute(Vendor::Proofpoint, LIST, ok).await.unwrap();
        assert!(limiter.state(Vendor::Proofpoint).await.is_none());
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(3),
            max_attempts: 5,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_secs(3));
        assert_eq!(policy.delay(40), Duration::from_secs(3));

        for retry in 1..6 {
            let jittered = policy.jittered(retry);
            assert!(jittered >= policy.delay(retry) / 2);
            assert!(jittered <= policy.delay(retry));
        }
    }

    #[test]
    fn parses_relative_and_epoch_reset() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let headers = RateLimitHeaders::parse(
            |name| match name {
                "x-ratelimit-remaining" => Some("5998"),
                "x-ratelimit-reset" => Some("1714521630"),
                _ => None,
            },
            now,
        );
        assert_eq!(headers.remaining, Some(5998));
        assert_eq!(headers.reset_after, Some(Duration::from_secs(30)));

        let headers = RateLimitHeaders::parse(
            |name| (name == "x-ratelimit-reset").then_some("12"),
            now,
        );
        assert_eq!(headers.reset_after, Some(Duration::from_secs(12)));
    }

    #[test]
    fn parses_retry_after_seconds_and_http_date() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let headers = RateLimitHeaders::parse(|name| (name == "retry-after").then_some("17"), now);
        assert_eq!(headers.retry_after, Some(Duration::from_secs(17)));

        let headers = RateLimitHeaders::parse(
            |name| (name == "retry-after").then_some("Wed, 01 May 2024 00:01:00 GMT"),
            now,
        );
        assert_eq!(headers.retry_after, Some(Duration::from_secs(60)));

        let headers = RateLimitHeaders::parse(|_| None, now);
        assert!(headers.is_empty());
    }
}
