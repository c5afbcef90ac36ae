//! Proofpoint TAP client.
//!
//! The SIEM API answers one time interval per query, at most
//! `max_window_secs` long and no further back than `max_lookback_secs`.
//! A requested range is therefore walked as consecutive sub-windows; the
//! [`PageCursor::Window`] handed back holds the part still to fetch.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use secbridge_core::config::ProofpointConfig;
use secbridge_core::credential::Credential;
use secbridge_core::error::{BridgeError, ConfigError};
use secbridge_core::filter::EventFilter;
use secbridge_core::types::{EventCategory, TokenKey, Vendor};
use secbridge_credentials::{AnySecretStore, SecretStore};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{PageCursor, VendorClient, VendorRequest, VendorResponse, ensure_category};
use crate::http::{VendorHttp, token_outcome};
use crate::rate_limit::{CallOutcome, Operation, RateLimitHeaders};
use crate::token_cache::{AccessToken, TokenExchange};

const VENDOR: Vendor = Vendor::Proofpoint;

const SIEM_PATH: &str = "/v2/siem/all";

/// Filter keys accepted for email threats.
pub const FILTER_KEYS: &[&str] = &["threat_type", "threat_status"];

/// Record arrays of a SIEM response, in the order they are normalized.
pub const RECORD_ARRAYS: [&str; 4] = [
    "messagesDelivered",
    "messagesBlocked",
    "clicksPermitted",
    "clicksBlocked",
];

/// Session token for the TAP API.
///
/// Without a session endpoint the credential pair itself is the session,
/// presented as HTTP Basic auth and renewed every `lifetime`.
pub struct ProofpointExchange {
    client: reqwest::Client,
    session_url: Option<String>,
    lifetime: Duration,
    timeout: Duration,
}

impl ProofpointExchange {
    pub fn new(client: reqwest::Client, config: &ProofpointConfig, timeout: Duration) -> Self {
        let session_url = (!config.session_path.is_empty()).then(|| {
            format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.session_path
            )
        });
        Self {
            client,
            session_url,
            lifetime: Duration::from_secs(config.session_lifetime_secs),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(alias = "session_token", alias = "token")]
    access_token: String,
    expires_in: Option<u64>,
}

impl TokenExchange for ProofpointExchange {
    async fn exchange(&self, credential: &Credential) -> CallOutcome<AccessToken> {
        let fields = credential
            .require("service_principal")
            .and_then(|principal| Ok((principal, credential.require("secret")?)));
        let (principal, secret) = match fields {
            Ok(fields) => fields,
            Err(e) => return CallOutcome::Failed(e),
        };

        let Some(session_url) = &self.session_url else {
            let encoded = STANDARD.encode(format!("{principal}:{secret}"));
            return CallOutcome::Done(
                AccessToken::basic(encoded, self.lifetime),
                RateLimitHeaders::default(),
            );
        };

        let started = Instant::now();
        let sent = self
            .client
            .post(session_url)
            .form(&[("service_principal", principal), ("secret", secret)])
            .timeout(self.timeout)
            .send()
            .await;
        let lifetime = self.lifetime;
        token_outcome(VENDOR, sent, started, |body| {
            let parsed: SessionResponse = serde_json::from_value(body)
                .map_err(|e| format!("invalid session response: {e}"))?;
            let lifetime = parsed.expires_in.map_or(lifetime, Duration::from_secs);
            Ok(AccessToken::bearer(parsed.access_token, lifetime))
        })
        .await
    }
}

/// Splits `[start, end)` into consecutive windows no longer than `max_span`.
///
/// Windows are gap-free and non-overlapping: each starts where the previous
/// one ended. An empty range or a non-positive span yields no windows.
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use secbridge_vendors::proofpoint::split_windows;
///
/// let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
/// let windows = split_windows(start, start + TimeDelta::minutes(150), TimeDelta::hours(1));
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[2].1 - windows[2].0, TimeDelta::minutes(30));
/// ```
pub fn split_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_span: TimeDelta,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    if max_span <= TimeDelta::zero() {
        return Vec::new();
    }
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = cursor
            .checked_add_signed(max_span)
            .map_or(end, |candidate| candidate.min(end));
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

fn span(secs: u64) -> TimeDelta {
    TimeDelta::from_std(Duration::from_secs(secs)).unwrap_or(TimeDelta::MAX)
}

/// Email threat gateway client.
pub struct MailGatewayClient<S: SecretStore = AnySecretStore> {
    siem_url: String,
    max_window: TimeDelta,
    max_lookback: TimeDelta,
    default_lookback: TimeDelta,
    http: VendorHttp<S>,
    exchange: ProofpointExchange,
    key: TokenKey,
}

impl<S: SecretStore> MailGatewayClient<S> {
    pub fn new(config: &ProofpointConfig, http: VendorHttp<S>, token_timeout: Duration) -> Self {
        let exchange = ProofpointExchange::new(http.client().clone(), config, token_timeout);
        Self {
            siem_url: format!("{}{SIEM_PATH}", config.base_url.trim_end_matches('/')),
            max_window: span(config.max_window_secs),
            max_lookback: span(config.max_lookback_secs),
            default_lookback: span(config.default_lookback_secs),
            http,
            exchange,
            key: TokenKey::vendor(VENDOR),
        }
    }

    /// Range still to fetch for `request`, clamped to the lookback limit.
    fn remaining_range(
        &self,
        request: &VendorRequest,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), BridgeError> {
        let (start, end) = match &request.cursor {
            None => {
                let end = request.filter.until.unwrap_or(now);
                let start = request.filter.since.unwrap_or_else(|| {
                    end.checked_sub_signed(self.default_lookback)
                        .unwrap_or(DateTime::<Utc>::MIN_UTC)
                });
                (start, end)
            }
            Some(PageCursor::Window { start, end }) => (*start, *end),
            Some(other) => {
                return Err(ConfigError::InvalidFilter {
                    field: "cursor".to_owned(),
                    reason: format!("{VENDOR} pages by time window, got {other:?}"),
                }
                .into());
            }
        };

        let earliest = now
            .checked_sub_signed(self.max_lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if start < earliest {
            warn!(
                requested = %start,
                earliest = %earliest,
                "range starts beyond the lookback limit, clamping"
            );
            return Ok((earliest, end));
        }
        Ok((start, end))
    }

    fn empty_response(&self, category: EventCategory) -> VendorResponse {
        let body = RECORD_ARRAYS
            .iter()
            .map(|name| ((*name).to_owned(), json!([])))
            .collect::<serde_json::Map<_, _>>();
        VendorResponse::new(VENDOR, category, Value::Object(body))
    }
}

fn interval(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "{}/{}",
        start.format("%Y-%m-%dT%H:%M:%SZ"),
        end.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

impl<S: SecretStore> VendorClient for MailGatewayClient<S> {
    fn vendor(&self) -> Vendor {
        VENDOR
    }

    async fn list_events(&self, request: &VendorRequest) -> Result<VendorResponse, BridgeError> {
        ensure_category(VENDOR, request.category)?;
        request.filter.validate(FILTER_KEYS)?;

        let (start, end) = self.remaining_range(request, Utc::now())?;
        let Some(&(window_start, window_end)) =
            split_windows(start, end, self.max_window).first()
        else {
            debug!(%start, %end, "empty time range, nothing to fetch");
            return Ok(self.empty_response(request.category));
        };

        let mut params = vec![
            ("format", "json".to_owned()),
            ("interval", interval(window_start, window_end)),
        ];
        if let Some(threat_type) = request.filter.text("threat_type") {
            params.push(("threatType", threat_type));
        }
        if let Some(threat_status) = request.filter.text("threat_status") {
            params.push(("threatStatus", threat_status));
        }

        let siem_url = &self.siem_url;
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                request.operation(),
                request.timeout,
                |c| c.get(siem_url).query(&params),
            )
            .await?;

        let next = (window_end < end).then_some(PageCursor::Window {
            start: window_end,
            end,
        });
        let records: usize = RECORD_ARRAYS
            .iter()
            .filter_map(|name| reply.body.get(*name).and_then(Value::as_array))
            .map(Vec::len)
            .sum();
        debug!(
            window_start = %window_start,
            window_end = %window_end,
            records,
            has_more = next.is_some(),
            "proofpoint window fetched"
        );

        Ok(VendorResponse {
            id: Uuid::new_v4(),
            vendor: VENDOR,
            category: request.category,
            body: reply.body,
            next,
            status: reply.status,
            rate_limit: reply.rate_limit,
        })
    }

    async fn probe(&self, category: EventCategory) -> Result<(), BridgeError> {
        ensure_category(VENDOR, category)?;
        let now = Utc::now();
        let params = [
            ("format", "json".to_owned()),
            ("interval", interval(now - TimeDelta::minutes(1), now)),
        ];
        let siem_url = &self.siem_url;
        self.http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("probe"),
                None,
                |c| c.get(siem_url).query(&params),
            )
            .await?;
        Ok(())
    }
}
