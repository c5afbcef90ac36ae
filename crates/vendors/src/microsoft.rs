//! Microsoft Defender / Entra ID / Purview client over Microsoft Graph.
//!
//! Each sub-service holds its own token under the `microsoft/` namespace:
//!
//! | category        | `service` param        | token key                 | endpoint                               |
//! |-----------------|------------------------|---------------------------|----------------------------------------|
//! | `alert`         | `defender` (default)   | `microsoft/alerts`        | `/v1.0/security/alerts_v2`             |
//! | `alert`         | `purview`              | `microsoft/compliance`    | `/v1.0/security/alerts_v2`             |
//! | `identity-risk` | -                      | `microsoft/identity-risk` | `/v1.0/identityProtection/riskyUsers`  |
//!
//! Identity risk has two sources picked by the `source` param: risky users
//! (`risky-users`, default) and Entra sign-in logs (`sign-ins`, read from
//! `/v1.0/auditLogs/signIns`). Both use the `microsoft/identity-risk` token.
//!
//! Paging follows `@odata.nextLink`, which must point at the configured
//! Graph origin.

use std::time::Duration;

use secbridge_core::config::MicrosoftConfig;
use secbridge_core::credential::Credential;
use secbridge_core::error::{BridgeError, ConfigError};
use secbridge_core::filter::EventFilter;
use secbridge_core::types::{EventCategory, Severity, TokenKey, Vendor};
use secbridge_credentials::{AnySecretStore, SecretStore};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::{Origin, Url};
use uuid::Uuid;

use crate::client::{PageCursor, VendorClient, VendorRequest, VendorResponse};
use crate::http::{HttpReply, VendorHttp, oauth_bearer, token_outcome};
use crate::rate_limit::{CallOutcome, Operation};
use crate::token_cache::{AccessToken, TokenExchange};

const VENDOR: Vendor = Vendor::Microsoft;

const ALERTS_PATH: &str = "/v1.0/security/alerts_v2";
const RISKY_USERS_PATH: &str = "/v1.0/identityProtection/riskyUsers";
const SIGN_INS_PATH: &str = "/v1.0/auditLogs/signIns";
const PURVIEW_SOURCE: &str = "microsoftPurview";

/// Filter keys accepted for alerts.
pub const ALERT_FILTER_KEYS: &[&str] = &["service", "status"];
/// Filter keys accepted for identity risk.
pub const IDENTITY_RISK_FILTER_KEYS: &[&str] = &["source", "user", "status"];

/// Alert severities by ordinal. Graph has no critical alert severity.
const ALERT_SEVERITIES: [(&str, Severity); 4] = [
    ("informational", Severity::Info),
    ("low", Severity::Low),
    ("medium", Severity::Medium),
    ("high", Severity::High),
];

/// Risk levels by ordinal.
const RISK_LEVELS: [(&str, Severity); 4] = [
    ("none", Severity::Info),
    ("low", Severity::Low),
    ("medium", Severity::Medium),
    ("high", Severity::High),
];

/// OAuth2 client-credentials exchange for one scope.
pub struct MicrosoftExchange {
    client: reqwest::Client,
    authority: String,
    scope: String,
    timeout: Duration,
}

impl MicrosoftExchange {
    pub fn new(
        client: reqwest::Client,
        authority: &str,
        scope: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            authority: authority.trim_end_matches('/').to_owned(),
            scope: scope.into(),
            timeout,
        }
    }
}

impl TokenExchange for MicrosoftExchange {
    async fn exchange(&self, credential: &Credential) -> CallOutcome<AccessToken> {
        let fields = credential.require("tenant_id").and_then(|tenant| {
            Ok((
                tenant,
                credential.require("client_id")?,
                credential.require("client_secret")?,
            ))
        });
        let (tenant_id, client_id, client_secret) = match fields {
            Ok(fields) => fields,
            Err(e) => return CallOutcome::Failed(e),
        };

        let started = Instant::now();
        let sent = self
            .client
            .post(format!(
                "{}/{tenant_id}/oauth2/v2.0/token",
                self.authority
            ))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", self.scope.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await;
        token_outcome(VENDOR, sent, started, oauth_bearer).await
    }
}

struct SubService {
    key: TokenKey,
    exchange: MicrosoftExchange,
}

/// Resolved endpoint, token and OData filter for one request.
struct Target<'a> {
    service: &'a SubService,
    path: &'static str,
    filter: String,
}

/// Identity / mail / compliance suite client.
pub struct IdentitySuiteClient<S: SecretStore = AnySecretStore> {
    graph_base_url: String,
    graph_origin: Origin,
    max_page_size: usize,
    http: VendorHttp<S>,
    alerts: SubService,
    identity: SubService,
    compliance: SubService,
}

impl<S: SecretStore> IdentitySuiteClient<S> {
    /// # Errors
    ///
    /// `BridgeError::Config` when `graph_base_url` is not a valid URL.
    pub fn new(
        config: &MicrosoftConfig,
        http: VendorHttp<S>,
        token_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let graph = Url::parse(&config.graph_base_url).map_err(|e| ConfigError::InvalidValue {
            field: "microsoft.graph_base_url".to_owned(),
            reason: e.to_string(),
        })?;

        let sub_service = |name: &'static str, scope: &str| SubService {
            key: TokenKey::scoped(VENDOR, name),
            exchange: MicrosoftExchange::new(
                http.client().clone(),
                &config.authority,
                scope,
                token_timeout,
            ),
        };
        let alerts = sub_service("alerts", &config.alerts_scope);
        let identity = sub_service("identity-risk", &config.identity_scope);
        let compliance = sub_service("compliance", &config.compliance_scope);

        Ok(Self {
            graph_base_url: config.graph_base_url.trim_end_matches('/').to_owned(),
            graph_origin: graph.origin(),
            max_page_size: config.max_page_size,
            http,
            alerts,
            identity,
            compliance,
        })
    }

    fn target(&self, category: EventCategory, filter: &EventFilter) -> Result<Target<'_>, BridgeError> {
        match category {
            EventCategory::Alert => {
                filter.validate(ALERT_FILTER_KEYS)?;
                let purview = match filter.text("service").as_deref() {
                    None | Some("defender") => false,
                    Some("purview") => true,
                    Some(other) => {
                        return Err(ConfigError::InvalidFilter {
                            field: "service".to_owned(),
                            reason: format!("expected 'defender' or 'purview', got '{other}'"),
                        }
                        .into());
                    }
                };
                Ok(Target {
                    service: if purview { &self.compliance } else { &self.alerts },
                    path: ALERTS_PATH,
                    filter: alert_odata(filter, purview),
                })
            }
            EventCategory::IdentityRisk => {
                filter.validate(IDENTITY_RISK_FILTER_KEYS)?;
                let (path, odata) = match filter.text("source").as_deref() {
                    None | Some("risky-users") => (RISKY_USERS_PATH, risky_user_odata(filter)),
                    Some("sign-ins") => (SIGN_INS_PATH, sign_in_odata(filter)),
                    Some(other) => {
                        return Err(ConfigError::InvalidFilter {
                            field: "source".to_owned(),
                            reason: format!("expected 'risky-users' or 'sign-ins', got '{other}'"),
                        }
                        .into());
                    }
                };
                Ok(Target {
                    service: &self.identity,
                    path,
                    filter: odata,
                })
            }
            other => Err(ConfigError::InvalidFilter {
                field: "category".to_owned(),
                reason: format!("{VENDOR} does not serve {other}"),
            }
            .into()),
        }
    }

    /// Parses `url` and checks that it stays on the configured Graph origin.
    fn checked_link(&self, url: &str) -> Result<Url, BridgeError> {
        let parsed = Url::parse(url).map_err(|e| BridgeError::Decode {
            vendor: VENDOR,
            reason: format!("invalid nextLink: {e}"),
        })?;
        if parsed.origin() != self.graph_origin {
            warn!(link = %url, "nextLink points outside the configured graph host");
            return Err(BridgeError::Decode {
                vendor: VENDOR,
                reason: format!("nextLink host {:?} is not the configured graph host", parsed.host_str()),
            });
        }
        Ok(parsed)
    }

    async fn get(
        &self,
        service: &SubService,
        operation: Operation,
        timeout: Option<Duration>,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<HttpReply, BridgeError> {
        self.http
            .send(&service.key, &service.exchange, operation, timeout, |c| {
                c.get(url).query(params)
            })
            .await
    }
}

/// `$filter` for security alerts.
pub fn alert_odata(filter: &EventFilter, purview: bool) -> String {
    let mut clauses = vec![if purview {
        format!("serviceSource eq '{PURVIEW_SOURCE}'")
    } else {
        format!("serviceSource ne '{PURVIEW_SOURCE}'")
    }];
    if let Some(since) = filter.since {
        clauses.push(format!("createdDateTime ge {}", odata_time(since)));
    }
    if let Some(until) = filter.until {
        clauses.push(format!("createdDateTime lt {}", odata_time(until)));
    }
    if let Some(clause) = level_clause("severity", &ALERT_SEVERITIES, filter.min_severity) {
        clauses.push(clause);
    }
    if let Some(status) = filter.text("status") {
        clauses.push(format!("status eq '{}'", odata_escape(&status)));
    }
    clauses.join(" and ")
}

/// `$filter` for risky users. `status` maps to `riskState`.
pub fn risky_user_odata(filter: &EventFilter) -> String {
    let mut clauses = Vec::new();
    if let Some(since) = filter.since {
        clauses.push(format!("riskLastUpdatedDateTime ge {}", odata_time(since)));
    }
    if let Some(until) = filter.until {
        clauses.push(format!("riskLastUpdatedDateTime lt {}", odata_time(until)));
    }
    if let Some(clause) = level_clause("riskLevel", &RISK_LEVELS, filter.min_severity) {
        clauses.push(clause);
    }
    if let Some(user) = filter.text("user") {
        clauses.push(format!("userPrincipalName eq '{}'", odata_escape(&user)));
    }
    if let Some(state) = filter.text("status") {
        clauses.push(format!("riskState eq '{}'", odata_escape(&state)));
    }
    clauses.join(" and ")
}

/// `$filter` for sign-in logs. `status` maps to `riskState`.
pub fn sign_in_odata(filter: &EventFilter) -> String {
    let mut clauses = Vec::new();
    if let Some(since) = filter.since {
        clauses.push(format!("createdDateTime ge {}", odata_time(since)));
    }
    if let Some(until) = filter.until {
        clauses.push(format!("createdDateTime lt {}", odata_time(until)));
    }
    if let Some(clause) = level_clause("riskLevelDuringSignIn", &RISK_LEVELS, filter.min_severity) {
        clauses.push(clause);
    }
    if let Some(user) = filter.text("user") {
        clauses.push(format!("userPrincipalName eq '{}'", odata_escape(&user)));
    }
    if let Some(state) = filter.text("status") {
        clauses.push(format!("riskState eq '{}'", odata_escape(&state)));
    }
    clauses.join(" and ")
}

/// `(field eq 'a' or field eq 'b')` for every level at or above `min`.
///
/// `None` when nothing can be pushed down; the facade still drops events
/// below the minimum after normalization.
fn level_clause(
    field: &str,
    levels: &[(&str, Severity)],
    min: Option<Severity>,
) -> Option<String> {
    let min = min?;
    let matching: Vec<String> = levels
        .iter()
        .filter(|(_, severity)| *severity >= min)
        .map(|(name, _)| format!("{field} eq '{name}'"))
        .collect();
    match matching.len() {
        0 => None,
        1 => matching.into_iter().next(),
        _ => Some(format!("({})", matching.join(" or "))),
    }
}

/// Severity of a Graph alert severity / risk level name.
pub(crate) fn severity_from_level(name: &str) -> Option<Severity> {
    ALERT_SEVERITIES
        .iter()
        .chain(RISK_LEVELS.iter())
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, severity)| *severity)
}

fn odata_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn odata_escape(value: &str) -> String {
    value.replace('\'', "''")
}

impl<S: SecretStore> VendorClient for IdentitySuiteClient<S> {
    fn vendor(&self) -> Vendor {
        VENDOR
    }

    async fn list_events(&self, request: &VendorRequest) -> Result<VendorResponse, BridgeError> {
        let target = self.target(request.category, &request.filter)?;

        let reply = match &request.cursor {
            None => {
                let mut params = vec![(
                    "$top",
                    request.page_limit(self.max_page_size).to_string(),
                )];
                if !target.filter.is_empty() {
                    params.push(("$filter", target.filter.clone()));
                }
                let url = format!("{}{}", self.graph_base_url, target.path);
                self.get(target.service, request.operation(), request.timeout, &url, &params)
                    .await?
            }
            Some(PageCursor::Link { url }) => {
                let link = self.checked_link(url)?;
                self.get(target.service, request.operation(), request.timeout, link.as_str(), &[])
                    .await?
            }
            Some(other) => {
                return Err(ConfigError::InvalidFilter {
                    field: "cursor".to_owned(),
                    reason: format!("{VENDOR} pages by link, got {other:?}"),
                }
                .into());
            }
        };

        let next = match reply.body.get("@odata.nextLink").and_then(Value::as_str) {
            Some(link) => Some(PageCursor::Link {
                url: self.checked_link(link)?.into(),
            }),
            None => None,
        };
        let records = reply.body.get("value").and_then(Value::as_array).map_or(0, Vec::len);
        debug!(
            category = %request.category,
            token_key = %target.service.key,
            records,
            has_more = next.is_some(),
            "graph page fetched"
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
        let target = self.target(category, &EventFilter::new())?;
        let url = format!("{}{}", self.graph_base_url, target.path);
        self.get(
            target.service,
            Operation::idempotent("probe"),
            None,
            &url,
            &[("$top", "1".to_owned())],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::{TimeZone, Utc};
    use secbridge_core::filter::FilterValue;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/tenant/oauth2/v2.0/token";

    fn config(server: &MockServer) -> MicrosoftConfig {
        MicrosoftConfig {
            authority: server.uri(),
            graph_base_url: server.uri(),
            compliance_scope: "api://compliance/.default".to_owned(),
            ..MicrosoftConfig::default()
        }
    }

    fn client(server: &MockServer) -> IdentitySuiteClient<testing::MemoryStore> {
        IdentitySuiteClient::new(
            &config(server),
            testing::vendor_http(VENDOR),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_token(server: &MockServer, scope_marker: &str, token: &str, expect: u64) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(scope_marker))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": token
            })))
            .expect(expect)
            .mount(server)
            .await;
    }

    #[test]
    fn alert_filter_defaults_to_defender() {
        let filter = EventFilter::new()
            .since(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
            .min_severity(Severity::Medium)
            .param("status", FilterValue::Text("new".to_owned()));
        assert_eq!(
            alert_odata(&filter, false),
            "serviceSource ne 'microsoftPurview' and createdDateTime ge 2024-05-01T00:00:00Z \
             and (severity eq 'medium' or severity eq 'high') and status eq 'new'"
        );
        assert_eq!(
            alert_odata(&EventFilter::new().min_severity(Severity::High), true),
            "serviceSource eq 'microsoftPurview' and severity eq 'high'"
        );
        // critical은 Graph에 없으므로 서버 측 조건 없음
        assert_eq!(
            alert_odata(&EventFilter::new().min_severity(Severity::Critical), false),
            "serviceSource ne 'microsoftPurview'"
        );
    }

    #[test]
    fn risky_user_filter_escapes_quotes() {
        let filter = EventFilter::new()
            .param("user", FilterValue::Text("o'neil@contoso.com".to_owned()))
            .param("status", FilterValue::Text("atRisk".to_owned()));
        assert_eq!(
            risky_user_odata(&filter),
            "userPrincipalName eq 'o''neil@contoso.com' and riskState eq 'atRisk'"
        );
    }

    #[test]
    fn sign_in_filter_uses_created_time_and_sign_in_risk() {
        let filter = EventFilter::new()
            .since(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
            .min_severity(Severity::High)
            .param("source", FilterValue::Text("sign-ins".to_owned()))
            .param("user", FilterValue::Text("kim@contoso.com".to_owned()));
        assert_eq!(
            sign_in_odata(&filter),
            "createdDateTime ge 2024-05-01T00:00:00Z and riskLevelDuringSignIn eq 'high' \
             and userPrincipalName eq 'kim@contoso.com'"
        );
    }

    #[test]
    fn level_names_map_to_severity() {
        assert_eq!(severity_from_level("High"), Some(Severity::High));
        assert_eq!(severity_from_level("informational"), Some(Severity::Info));
        assert_eq!(severity_from_level("none"), Some(Severity::Info));
        assert_eq!(severity_from_level("unknownFutureValue"), None);
    }

    #[tokio::test]
    async fn follows_next_link_on_same_host() {
        let server = MockServer::start().await;
        mount_token(&server, "graph.microsoft.com", "alerts-token", 1).await;
        let next = format!("{}{ALERTS_PATH}?$skiptoken=page2", server.uri());
        Mock::given(method("GET"))
            .and(path(ALERTS_PATH))
            .and(query_param("$top", "100"))
            .and(header("authorization", "Bearer alerts-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "a1" }],
                "@odata.nextLink": next
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let request = VendorRequest::new(VENDOR, EventCategory::Alert, EventFilter::new());
        let first = client.list_events(&request).await.unwrap();
        assert_eq!(first.next, Some(PageCursor::Link { url: next.clone() }));

        Mock::given(method("GET"))
            .and(path(ALERTS_PATH))
            .and(query_param("$skiptoken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "id": "a2" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let second = client
            .list_events(&request.clone().with_cursor(first.next))
            .await
            .unwrap();
        assert!(second.next.is_none());
        assert_eq!(second.body["value"][0]["id"], "a2");
    }

    #[tokio::test]
    async fn foreign_next_link_is_rejected() {
        let server = MockServer::start().await;
        mount_token(&server, "graph.microsoft.com", "alerts-token", 1).await;
        Mock::given(method("GET"))
            .and(path(RISKY_USERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [],
                "@odata.nextLink": "https://evil.example.com/v1.0/identityProtection/riskyUsers?$skiptoken=x"
            })))
            .mount(&server)
            .await;

        let request = VendorRequest::new(VENDOR, EventCategory::IdentityRisk, EventFilter::new());
        let err = client(&server).list_events(&request).await.unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[tokio::test]
    async fn each_sub_service_gets_its_own_token() {
        let server = MockServer::start().await;
        mount_token(&server, "compliance", "purview-token", 1).await;
        mount_token(&server, "graph.microsoft.com", "graph-token", 2).await;
        Mock::given(method("GET"))
            .and(path(ALERTS_PATH))
            .and(query_param("$filter", "serviceSource eq 'microsoftPurview'"))
            .and(header("authorization", "Bearer purview-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer graph-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let purview = VendorRequest::new(
            VENDOR,
            EventCategory::Alert,
            EventFilter::new().param("service", FilterValue::Text("purview".to_owned())),
        );
        client.list_events(&purview).await.unwrap();
        client.probe(EventCategory::Alert).await.unwrap();
        client.probe(EventCategory::IdentityRisk).await.unwrap();
    }

    #[tokio::test]
    async fn sign_in_source_reads_audit_logs_with_identity_token() {
        let server = MockServer::start().await;
        mount_token(&server, "graph.microsoft.com", "identity-token", 1).await;
        Mock::given(method("GET"))
            .and(path(SIGN_INS_PATH))
            .and(header("authorization", "Bearer identity-token"))
            .and(query_param("$filter", "userPrincipalName eq 'kim@contoso.com'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#auditLogs/signIns",
                "value": [{ "id": "s1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = VendorRequest::new(
            VENDOR,
            EventCategory::IdentityRisk,
            EventFilter::new()
                .param("source", FilterValue::Text("sign-ins".to_owned()))
                .param("user", FilterValue::Text("kim@contoso.com".to_owned())),
        );
        let client = client(&server);
        let response = client.list_events(&request).await.unwrap();
        assert_eq!(response.body["value"][0]["id"], "s1");
        assert_eq!(
            client.http.tokens().state(&TokenKey::scoped(VENDOR, "identity-risk")),
            crate::token_cache::TokenState::Valid
        );
    }

    #[tokio::test]
    async fn unknown_identity_source_is_rejected() {
        let server = MockServer::start().await;
        let request = VendorRequest::new(
            VENDOR,
            EventCategory::IdentityRisk,
            EventFilter::new().param("source", FilterValue::Text("audit".to_owned())),
        );
        let err = client(&server).list_events(&request).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("audit"));
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let server = MockServer::start().await;
        let request = VendorRequest::new(
            VENDOR,
            EventCategory::Alert,
            EventFilter::new().param("service", FilterValue::Text("sentinel".to_owned())),
        );
        let err = client(&server).list_events(&request).await.unwrap_err();
        assert!(err.to_string().contains("sentinel"));
    }
}
