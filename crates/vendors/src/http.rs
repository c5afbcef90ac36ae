//! Shared HTTP core for vendor clients.
//!
//! Attaches the cached token, runs the request through the rate limiter and
//! maps HTTP outcomes onto the error taxonomy:
//!
//! - 2xx: body decoded as JSON
//! - 401 / 403: token and credential invalidated, whole request retried once,
//!   then `AuthenticationFailed`
//! - 429 / 5xx: rate limiter retry sequence
//! - other 4xx: `Upstream` immediately
//! - transport timeout: `Timeout`, never retried

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use secbridge_core::error::BridgeError;
use secbridge_core::metrics as m;
use secbridge_core::types::{TokenKey, Vendor};
use secbridge_credentials::{AnySecretStore, SecretStore};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::rate_limit::{CallOutcome, Operation, RateLimitHeaders};
use crate::token_cache::{AccessToken, TokenCache, TokenExchange};

/// Upstream error bodies are cut to this many characters.
const MAX_REASON_LEN: usize = 256;

/// A decoded vendor response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
    pub rate_limit: RateLimitHeaders,
}

/// Authenticated, rate-limited HTTP access for one vendor.
pub struct VendorHttp<S: SecretStore = AnySecretStore> {
    vendor: Vendor,
    client: reqwest::Client,
    tokens: Arc<TokenCache<S>>,
    default_timeout: Duration,
}

impl<S: SecretStore> VendorHttp<S> {
    pub fn new(
        vendor: Vendor,
        client: reqwest::Client,
        tokens: Arc<TokenCache<S>>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            vendor,
            client,
            tokens,
            default_timeout,
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn tokens(&self) -> &Arc<TokenCache<S>> {
        &self.tokens
    }

    /// Returns a valid token for `key`, fetching it when needed.
    pub async fn token<E: TokenExchange>(
        &self,
        key: &TokenKey,
        exchange: &E,
    ) -> Result<AccessToken, BridgeError> {
        self.tokens.get_token(key, exchange).await
    }

    /// Sends an authenticated request built by `build`.
    ///
    /// `build` is called once per attempt, so it must be cheap and pure.
    ///
    /// # Errors
    ///
    /// - `BridgeError::AuthenticationFailed`: still rejected after one
    ///   token refresh
    /// - `BridgeError::Upstream`: non-retryable 4xx or transport failure
    /// - `BridgeError::Timeout`: the request exceeded `timeout`
    /// - `BridgeError::Decode`: 2xx body is not JSON
    /// - rate limiter and token cache errors
    pub async fn send<E, B>(
        &self,
        key: &TokenKey,
        exchange: &E,
        operation: Operation,
        timeout: Option<Duration>,
        build: B,
    ) -> Result<HttpReply, BridgeError>
    where
        E: TokenExchange,
        B: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);

        let reply = self.attempt(key, exchange, operation, timeout, &build).await?;
        if !is_auth_rejection(reply.status) {
            return Ok(reply);
        }

        warn!(
            vendor = %self.vendor,
            token_key = %key,
            operation = operation.name,
            status = reply.status,
            "request rejected, refreshing credential and token"
        );
        self.tokens.invalidate(key).await;

        let reply = self.attempt(key, exchange, operation, timeout, &build).await?;
        if is_auth_rejection(reply.status) {
            return Err(BridgeError::AuthenticationFailed {
                vendor: self.vendor,
                reason: format!(
                    "{} rejected with status {} after token refresh",
                    operation.name, reply.status
                ),
            });
        }
        Ok(reply)
    }

    async fn attempt<E, B>(
        &self,
        key: &TokenKey,
        exchange: &E,
        operation: Operation,
        timeout: Duration,
        build: &B,
    ) -> Result<HttpReply, BridgeError>
    where
        E: TokenExchange,
        B: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.tokens.get_token(key, exchange).await?;
        let authorization = token.header_value();
        let authorization = authorization.as_str();
        let client = &self.client;
        let vendor = self.vendor;

        debug!(vendor = %vendor, operation = operation.name, "sending vendor request");
        self.tokens
            .limiter()
            .execute(vendor, operation, move || async move {
                let request = build(client)
                    .header(AUTHORIZATION, authorization)
                    .timeout(timeout);
                send_once(vendor, request).await
            })
            .await
    }
}

fn is_auth_rejection(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Sends one request and classifies the outcome for the rate limiter.
///
/// 401/403 come back as `Done` so the caller can refresh and retry.
pub(crate) async fn send_once(
    vendor: Vendor,
    request: reqwest::RequestBuilder,
) -> CallOutcome<HttpReply> {
    let started = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => return CallOutcome::Failed(transport_error(vendor, &e, started)),
    };

    metrics::histogram!(
        m::VENDOR_REQUEST_DURATION_SECONDS,
        m::LABEL_VENDOR => vendor.as_str()
    )
    .record(started.elapsed().as_secs_f64());

    let status = response.status().as_u16();
    let rate_limit = RateLimitHeaders::from_headers(response.headers());
    metrics::counter!(
        m::VENDOR_REQUESTS_TOTAL,
        m::LABEL_VENDOR => vendor.as_str(),
        m::LABEL_RESULT => if response.status().is_success() { "success" } else { "failure" }
    )
    .increment(1);

    match status {
        200..=299 => match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => CallOutcome::Done(
                HttpReply {
                    status,
                    body: Value::Null,
                    rate_limit,
                },
                rate_limit,
            ),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(body) => CallOutcome::Done(
                    HttpReply {
                        status,
                        body,
                        rate_limit,
                    },
                    rate_limit,
                ),
                Err(e) => CallOutcome::Failed(BridgeError::Decode {
                    vendor,
                    reason: e.to_string(),
                }),
            },
            Err(e) => CallOutcome::Failed(transport_error(vendor, &e, started)),
        },
        401 | 403 => CallOutcome::Done(
            HttpReply {
                status,
                body: Value::Null,
                rate_limit,
            },
            rate_limit,
        ),
        429 => CallOutcome::Throttled(rate_limit),
        500..=599 => CallOutcome::ServerError(status, rate_limit),
        _ => {
            let text = response.text().await.unwrap_or_default();
            CallOutcome::Failed(BridgeError::Upstream {
                vendor,
                status,
                reason: truncate(&text),
            })
        }
    }
}

pub(crate) fn transport_error(vendor: Vendor, e: &reqwest::Error, started: Instant) -> BridgeError {
    if e.is_timeout() {
        BridgeError::Timeout {
            vendor,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        BridgeError::Upstream {
            vendor,
            status: 0,
            reason: format!("transport error: {e}"),
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_REASON_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

/// Standard OAuth2 token endpoint response.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Parses an OAuth2 client-credentials response into a bearer token.
pub(crate) fn oauth_bearer(body: Value) -> Result<AccessToken, String> {
    let parsed: OAuthTokenResponse =
        serde_json::from_value(body).map_err(|e| format!("invalid token response: {e}"))?;
    Ok(AccessToken::bearer(
        parsed.access_token,
        Duration::from_secs(parsed.expires_in),
    ))
}

/// Classifies a token endpoint response.
///
/// 400/401/403 mean the credential itself was rejected and are never retried.
pub(crate) async fn token_outcome(
    vendor: Vendor,
    sent: Result<reqwest::Response, reqwest::Error>,
    started: Instant,
    parse: impl FnOnce(Value) -> Result<AccessToken, String>,
) -> CallOutcome<AccessToken> {
    let response = match sent {
        Ok(response) => response,
        Err(e) => return CallOutcome::Failed(transport_error(vendor, &e, started)),
    };

    let status = response.status().as_u16();
    let rate_limit = RateLimitHeaders::from_headers(response.headers());
    match status {
        200..=299 => match response.json::<Value>().await {
            Ok(body) => match parse(body) {
                Ok(token) => CallOutcome::Done(token, rate_limit),
                Err(reason) => CallOutcome::Failed(BridgeError::Decode { vendor, reason }),
            },
            Err(e) => CallOutcome::Failed(BridgeError::Decode {
                vendor,
                reason: format!("invalid token response: {e}"),
            }),
        },
        400 | 401 | 403 => {
            let text = response.text().await.unwrap_or_default();
            CallOutcome::Failed(BridgeError::AuthenticationFailed {
                vendor,
                reason: format!("token endpoint returned {status}: {}", truncate(&text)),
            })
        }
        429 => CallOutcome::Throttled(rate_limit),
        500..=599 => CallOutcome::ServerError(status, rate_limit),
        _ => CallOutcome::Failed(BridgeError::Upstream {
            vendor,
            status,
            reason: "unexpected token endpoint status".to_owned(),
        }),
    }
}
