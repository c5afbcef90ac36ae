//! CrowdStrike Falcon client.
//!
//! Every listing is two calls: an id query with an FQL filter and
//! offset/limit paging, then an entity lookup for the returned ids. The
//! entity response is the page body handed to the normalizer.
//!
//! Host, threat-intel and vulnerability lookups are served directly rather
//! than through the facade.

use std::fmt;
use std::time::Duration;

use secbridge_core::config::CrowdStrikeConfig;
use secbridge_core::credential::Credential;
use secbridge_core::error::{BridgeError, ConfigError};
use secbridge_core::filter::{EventFilter, FilterValue};
use secbridge_core::types::{EventCategory, Severity, TokenKey, Vendor};
use secbridge_credentials::{AnySecretStore, SecretStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::client::{PageCursor, VendorClient, VendorRequest, VendorResponse};
use crate::http::{VendorHttp, oauth_bearer, token_outcome};
use crate::rate_limit::{CallOutcome, Operation};
use crate::token_cache::{AccessToken, TokenExchange};

const VENDOR: Vendor = Vendor::CrowdStrike;

const TOKEN_PATH: &str = "/oauth2/token";
const HOSTS_QUERY_PATH: &str = "/devices/queries/devices/v1";
const HOSTS_ENTITIES_PATH: &str = "/devices/entities/devices/v2";
const INTEL_INDICATORS_PATH: &str = "/intel/combined/indicators/v1";
const VULNS_QUERY_PATH: &str = "/spotlight/queries/vulnerabilities/v1";
const VULNS_ENTITIES_PATH: &str = "/spotlight/entities/vulnerabilities/v2";

/// Result cap for intel and vulnerability lookups.
const LOOKUP_LIMIT: &str = "100";

/// Filter keys accepted for detections.
pub const DETECTION_FILTER_KEYS: &[&str] = &["status", "hostname"];
/// Filter keys accepted for incidents.
pub const INCIDENT_FILTER_KEYS: &[&str] = &["status"];

/// Display names used by `max_severity_displayname`, by severity ordinal.
const SEVERITY_NAMES: [&str; 5] = ["Informational", "Low", "Medium", "High", "Critical"];

/// OAuth2 client-credentials exchange against `/oauth2/token`.
pub struct CrowdStrikeExchange {
    client: reqwest::Client,
    token_url: String,
    timeout: Duration,
}

impl CrowdStrikeExchange {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            token_url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            timeout,
        }
    }
}

impl TokenExchange for CrowdStrikeExchange {
    async fn exchange(&self, credential: &Credential) -> CallOutcome<AccessToken> {
        let fields = credential
            .require("client_id")
            .and_then(|id| Ok((id, credential.require("client_secret")?)));
        let (client_id, client_secret) = match fields {
            Ok(fields) => fields,
            Err(e) => return CallOutcome::Failed(e),
        };

        let started = Instant::now();
        let sent = self
            .client
            .post(&self.token_url)
            .form(&[("client_id", client_id), ("client_secret", client_secret)])
            .timeout(self.timeout)
            .send()
            .await;
        token_outcome(VENDOR, sent, started, oauth_bearer).await
    }
}

/// Query / entity endpoints and filter grammar for one category.
struct Resource {
    category: EventCategory,
    query_path: &'static str,
    entities_path: &'static str,
    sort: &'static str,
    allowed: &'static [&'static str],
}

impl Resource {
    fn for_category(category: EventCategory) -> Result<Self, BridgeError> {
        match category {
            EventCategory::Detection => Ok(Self {
                category,
                query_path: "/detects/queries/detects/v1",
                entities_path: "/detects/entities/summaries/GET/v1",
                sort: "first_behavior.desc",
                allowed: DETECTION_FILTER_KEYS,
            }),
            EventCategory::Incident => Ok(Self {
                category,
                query_path: "/incidents/queries/incidents/v1",
                entities_path: "/incidents/entities/incidents/GET/v1",
                sort: "start.desc",
                allowed: INCIDENT_FILTER_KEYS,
            }),
            other => Err(ConfigError::InvalidFilter {
                field: "category".to_owned(),
                reason: format!("{VENDOR} does not serve {other}"),
            }
            .into()),
        }
    }

    fn fql(&self, filter: &EventFilter) -> Result<String, BridgeError> {
        filter.validate(self.allowed)?;
        match self.category {
            EventCategory::Incident => incident_fql(filter),
            _ => Ok(detection_fql(filter)),
        }
    }

    fn details_operation(&self) -> Operation {
        match self.category {
            EventCategory::Incident => Operation::idempotent("get-incident-details"),
            _ => Operation::idempotent("get-detection-details"),
        }
    }
}

/// Builds the FQL filter for the detections query.
///
/// ```
/// use secbridge_core::{EventFilter, Severity};
/// use secbridge_vendors::crowdstrike::detection_fql;
///
/// let fql = detection_fql(&EventFilter::new().min_severity(Severity::High));
/// assert_eq!(fql, "max_severity_displayname:['High','Critical']");
/// ```
pub fn detection_fql(filter: &EventFilter) -> String {
    let mut clauses = Vec::new();
    if let Some(since) = filter.since {
        clauses.push(format!("first_behavior:>='{}'", fql_time(since)));
    }
    if let Some(until) = filter.until {
        clauses.push(format!("first_behavior:<'{}'", fql_time(until)));
    }
    if let Some(min) = filter.min_severity {
        let names: Vec<String> = SEVERITY_NAMES[usize::from(min.ordinal())..]
            .iter()
            .map(|name| format!("'{name}'"))
            .collect();
        clauses.push(format!("max_severity_displayname:[{}]", names.join(",")));
    }
    if let Some(status) = filter.text("status") {
        clauses.push(format!("status:'{}'", fql_escape(&status)));
    }
    if let Some(hostname) = filter.text("hostname") {
        clauses.push(format!("device.hostname:'{}'", fql_escape(&hostname)));
    }
    clauses.join("+")
}

/// Builds the FQL filter for the incidents query.
///
/// Incident severity is the 0–100 `fine_score`; a minimum severity maps to
/// the lower bound of its 20-point band. Status accepts the numeric code or
/// one of `new`, `reopened`, `in_progress`, `closed`.
pub fn incident_fql(filter: &EventFilter) -> Result<String, BridgeError> {
    let mut clauses = Vec::new();
    if let Some(since) = filter.since {
        clauses.push(format!("start:>='{}'", fql_time(since)));
    }
    if let Some(until) = filter.until {
        clauses.push(format!("start:<'{}'", fql_time(until)));
    }
    if let Some(min) = filter.min_severity {
        clauses.push(format!("fine_score:>={}", u32::from(min.ordinal()) * 20));
    }
    if let Some(value) = filter.params.get("status") {
        let code = match value {
            FilterValue::Number(code) => *code,
            FilterValue::Text(name) => incident_status_code(name).ok_or_else(|| {
                BridgeError::from(ConfigError::InvalidFilter {
                    field: "status".to_owned(),
                    reason: format!("unknown incident status '{name}'"),
                })
            })?,
            FilterValue::Flag(_) => {
                return Err(ConfigError::InvalidFilter {
                    field: "status".to_owned(),
                    reason: "expected a status name or code".to_owned(),
                }
                .into());
            }
        };
        clauses.push(format!("status:{code}"));
    }
    Ok(clauses.join("+"))
}

fn incident_status_code(name: &str) -> Option<i64> {
    match name.to_lowercase().replace('-', "_").as_str() {
        "new" => Some(20),
        "reopened" => Some(25),
        "in_progress" => Some(30),
        "closed" => Some(40),
        _ => None,
    }
}

/// Builds the FQL filter for an intel indicator lookup.
pub fn intel_fql(indicator: &str, kind: IndicatorType) -> String {
    format!("indicator:'{}'+type:'{kind}'", fql_escape(indicator))
}

/// Builds the FQL filter for the vulnerabilities query: unresolved only,
/// optionally narrowed to one host.
pub fn vulnerability_fql(hostname: Option<&str>) -> String {
    let mut fql = "status:['open','reopen']".to_owned();
    if let Some(hostname) = hostname {
        fql.push_str(&format!("+host_info.hostname:'{}'", fql_escape(hostname)));
    }
    fql
}

fn fql_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn fql_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn decode_error(e: serde_json::Error) -> BridgeError {
    BridgeError::Decode {
        vendor: VENDOR,
        reason: e.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    meta: QueryMeta,
}

#[derive(Debug, Default, Deserialize)]
struct QueryMeta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct Entities<T> {
    #[serde(default = "Vec::new")]
    resources: Vec<T>,
}

/// Indicator kinds understood by the intel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorType {
    IpAddress,
    Domain,
    Md5,
    Sha256,
    Url,
}

impl IndicatorType {
    pub const ALL: [Self; 5] = [Self::IpAddress, Self::Domain, Self::Md5, Self::Sha256, Self::Url];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpAddress => "ip_address",
            Self::Domain => "domain",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Url => "url",
        }
    }

    /// Accepts the API names plus `ip`, with `-` or `_`.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ip_address" | "ip" => Some(Self::IpAddress),
            "domain" => Some(Self::Domain),
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intel record returned by `threat_intel`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelIndicator {
    pub id: Option<String>,
    pub indicator: Option<String>,
    #[serde(rename = "type")]
    pub indicator_type: Option<String>,
    pub malicious_confidence: Option<String>,
    /// Epoch seconds.
    pub published_date: Option<i64>,
    /// Epoch seconds.
    pub last_updated: Option<i64>,
    pub actors: Vec<String>,
    pub malware_families: Vec<String>,
    pub threat_types: Vec<String>,
}

/// Vulnerability record returned by `vulnerabilities`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vulnerability {
    pub id: Option<String>,
    /// Agent id of the affected host.
    pub aid: Option<String>,
    pub status: Option<String>,
    pub created_timestamp: Option<String>,
    pub updated_timestamp: Option<String>,
    pub cve: Option<CveDetails>,
    pub host_info: Option<VulnerableHost>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CveDetails {
    pub id: Option<String>,
    pub base_score: Option<f64>,
    pub severity: Option<String>,
    pub exprt_rating: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerableHost {
    pub hostname: Option<String>,
    pub local_ip: Option<String>,
    pub platform: Option<String>,
}

/// Host record returned by `lookup_host`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDetails {
    pub device_id: Option<String>,
    pub hostname: Option<String>,
    pub platform_name: Option<String>,
    pub os_version: Option<String>,
    pub local_ip: Option<String>,
    pub external_ip: Option<String>,
    pub mac_address: Option<String>,
    pub agent_version: Option<String>,
    pub status: Option<String>,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

/// Endpoint-detection platform client.
pub struct EndpointDetectionClient<S: SecretStore = AnySecretStore> {
    base_url: String,
    max_page_size: usize,
    key: TokenKey,
    http: VendorHttp<S>,
    exchange: CrowdStrikeExchange,
}

impl<S: SecretStore> EndpointDetectionClient<S> {
    pub fn new(config: &CrowdStrikeConfig, http: VendorHttp<S>, token_timeout: Duration) -> Self {
        let exchange =
            CrowdStrikeExchange::new(http.client().clone(), &config.base_url, token_timeout);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            max_page_size: config.max_page_size,
            key: TokenKey::vendor(VENDOR),
            http,
            exchange,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Looks up a host by exact hostname.
    ///
    /// Returns `Ok(None)` when no device matches.
    pub async fn lookup_host(&self, hostname: &str) -> Result<Option<HostDetails>, BridgeError> {
        let query_url = self.url(HOSTS_QUERY_PATH);
        let filter = format!("hostname:'{}'", fql_escape(hostname));
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("query-hosts"),
                None,
                |c| {
                    c.get(&query_url)
                        .query(&[("filter", filter.as_str()), ("limit", "1")])
                },
            )
            .await?;
        let ids: QueryResponse = serde_json::from_value(reply.body).map_err(decode_error)?;
        let Some(device_id) = ids.resources.into_iter().next() else {
            debug!(hostname, "no device matched hostname");
            return Ok(None);
        };

        let entities_url = self.url(HOSTS_ENTITIES_PATH);
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("get-host-details"),
                None,
                |c| c.get(&entities_url).query(&[("ids", device_id.as_str())]),
            )
            .await?;

        let entities: Entities<HostDetails> =
            serde_json::from_value(reply.body).map_err(decode_error)?;
        Ok(entities.resources.into_iter().next())
    }

    /// Threat intelligence for one indicator, up to 100 records.
    ///
    /// # Errors
    ///
    /// `BridgeError::Config` for an empty indicator, before any call.
    pub async fn threat_intel(
        &self,
        indicator: &str,
        kind: IndicatorType,
    ) -> Result<Vec<IntelIndicator>, BridgeError> {
        let indicator = indicator.trim();
        if indicator.is_empty() {
            return Err(ConfigError::InvalidFilter {
                field: "indicator".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        let url = self.url(INTEL_INDICATORS_PATH);
        let filter = intel_fql(indicator, kind);
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("query-intel-indicators"),
                None,
                |c| {
                    c.get(&url)
                        .query(&[("filter", filter.as_str()), ("limit", LOOKUP_LIMIT)])
                },
            )
            .await?;
        let entities: Entities<IntelIndicator> =
            serde_json::from_value(reply.body).map_err(decode_error)?;
        debug!(
            indicator,
            %kind,
            matches = entities.resources.len(),
            "threat intel lookup completed"
        );
        Ok(entities.resources)
    }

    /// Open vulnerabilities, optionally for one host, up to 100 records.
    pub async fn vulnerabilities(
        &self,
        hostname: Option<&str>,
    ) -> Result<Vec<Vulnerability>, BridgeError> {
        let query_url = self.url(VULNS_QUERY_PATH);
        let filter = vulnerability_fql(hostname);
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("query-vulnerabilities"),
                None,
                |c| {
                    c.get(&query_url)
                        .query(&[("filter", filter.as_str()), ("limit", LOOKUP_LIMIT)])
                },
            )
            .await?;
        let ids: QueryResponse = serde_json::from_value(reply.body).map_err(decode_error)?;
        if ids.resources.is_empty() {
            debug!(hostname = hostname.unwrap_or("*"), "no open vulnerabilities");
            return Ok(Vec::new());
        }

        let entities_url = self.url(VULNS_ENTITIES_PATH);
        let id_params: Vec<(&str, &str)> =
            ids.resources.iter().map(|id| ("ids", id.as_str())).collect();
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("get-vulnerability-details"),
                None,
                |c| c.get(&entities_url).query(&id_params),
            )
            .await?;
        let entities: Entities<Vulnerability> =
            serde_json::from_value(reply.body).map_err(decode_error)?;
        Ok(entities.resources)
    }
}

impl<S: SecretStore> VendorClient for EndpointDetectionClient<S> {
    fn vendor(&self) -> Vendor {
        VENDOR
    }

    async fn list_events(&self, request: &VendorRequest) -> Result<VendorResponse, BridgeError> {
        let resource = Resource::for_category(request.category)?;
        let fql = resource.fql(&request.filter)?;
        let offset = match &request.cursor {
            None => 0,
            Some(PageCursor::Offset { offset }) => *offset,
            Some(other) => {
                return Err(ConfigError::InvalidFilter {
                    field: "cursor".to_owned(),
                    reason: format!("{VENDOR} pages by offset, got {other:?}"),
                }
                .into());
            }
        };
        let limit = request.page_limit(self.max_page_size);

        let mut params = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("sort", resource.sort.to_owned()),
        ];
        if !fql.is_empty() {
            params.push(("filter", fql));
        }

        let query_url = self.url(resource.query_path);
        let reply = self
            .http
            .send(
                &self.key,
                &self.exchange,
                request.operation(),
                request.timeout,
                |c| c.get(&query_url).query(&params),
            )
            .await?;
        let query: QueryResponse = serde_json::from_value(reply.body).map_err(decode_error)?;

        let fetched = u32::try_from(query.resources.len()).unwrap_or(u32::MAX);
        let next_offset = offset.saturating_add(fetched);
        let more = match query.meta.pagination {
            Some(pagination) => u64::from(next_offset) < pagination.total,
            None => query.resources.len() >= limit,
        };
        let next = (fetched > 0 && more).then_some(PageCursor::Offset {
            offset: next_offset,
        });
        debug!(
            category = %request.category,
            offset,
            fetched,
            has_more = next.is_some(),
            "crowdstrike id query completed"
        );

        if query.resources.is_empty() {
            return Ok(VendorResponse {
                id: Uuid::new_v4(),
                vendor: VENDOR,
                category: request.category,
                body: json!({ "resources": [] }),
                next: None,
                status: reply.status,
                rate_limit: reply.rate_limit,
            });
        }

        let entities_url = self.url(resource.entities_path);
        let payload = json!({ "ids": query.resources });
        let details = self
            .http
            .send(
                &self.key,
                &self.exchange,
                resource.details_operation(),
                request.timeout,
                |c| c.post(&entities_url).json(&payload),
            )
            .await?;

        Ok(VendorResponse {
            id: Uuid::new_v4(),
            vendor: VENDOR,
            category: request.category,
            body: details.body,
            next,
            status: details.status,
            rate_limit: details.rate_limit,
        })
    }

    async fn probe(&self, category: EventCategory) -> Result<(), BridgeError> {
        let resource = Resource::for_category(category)?;
        let query_url = self.url(resource.query_path);
        self.http
            .send(
                &self.key,
                &self.exchange,
                Operation::idempotent("probe"),
                None,
                |c| c.get(&query_url).query(&[("limit", "1")]),
            )
            .await?;
        Ok(())
    }
}

/// Maps a detection's `max_severity_displayname` to a severity.
pub(crate) fn severity_from_display_name(name: &str) -> Option<Severity> {
    SEVERITY_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .and_then(|ordinal| u8::try_from(ordinal).ok())
        .and_then(Severity::from_ordinal)
}
