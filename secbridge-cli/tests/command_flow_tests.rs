//! Integration tests for `secbridge fetch`, `health`, `host`, `intel` and `vulns`.
//!
//! Secret store and vendor APIs are served by one wiremock server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secbridge_cli::cli::{FetchArgs, HealthArgs};
use secbridge_cli::commands::{fetch, health, host, intel, vulns};
use secbridge_core::config::BridgeConfig;
use secbridge_core::types::{Severity, Vendor};
use secbridge_credentials::Environment;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn env() -> Environment {
    Environment::from_pairs([
        ("GOOGLE_CLOUD_PROJECT", "sec-ops"),
        ("GOOGLE_OAUTH_ACCESS_TOKEN", "static-token"),
    ])
}

fn config(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.cloud.gcp_endpoint = server.uri();
    config.http.max_attempts = 2;
    config.http.backoff_base_ms = 10;
    config.http.backoff_cap_ms = 50;
    config.crowdstrike.base_url = server.uri();
    config.microsoft.enabled = false;
    config.proofpoint.base_url = server.uri();
    config
}

async fn mount_secret(server: &MockServer, vendor: &str, secret: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!(
            "/v1/projects/sec-ops/secrets/{vendor}-api-credentials-prod/versions/latest:access"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": { "data": STANDARD.encode(secret.to_string()) }
        })))
        .mount(server)
        .await;
}

async fn mount_proofpoint(server: &MockServer) {
    mount_secret(
        server,
        "proofpoint",
        json!({ "service_principal": "sp", "secret": "pp-secret" }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/siem/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clicksBlocked": [{
                "GUID": "c1",
                "clickTime": "2024-05-01T00:05:00Z",
                "classification": "malware",
                "recipient": "jung@example.com",
                "url": "http://bad.example/x"
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_crowdstrike_token(server: &MockServer) {
    mount_secret(
        server,
        "crowdstrike",
        json!({ "client_id": "cs-id", "client_secret": "cs-secret" }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "access_token": "cs-token",
            "expires_in": 1799
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_restricted_to_one_vendor() {
    let server = MockServer::start().await;
    mount_proofpoint(&server).await;
    let config = config(&server);

    let args = FetchArgs {
        vendors: vec!["proofpoint".to_owned()],
        last: Some(30),
        pages: 1,
        ..FetchArgs::default()
    };
    let report = fetch::fetch_report(&args, &config, &env()).await.unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.pages, 1);
    assert_eq!(report.events.len(), 1);
    let event = &report.events[0];
    assert_eq!(event.source, Vendor::Proofpoint);
    assert_eq!(event.severity, Severity::Critical);
    assert!(event.tags.contains("disposition:blocked"));
}

#[tokio::test]
async fn fetch_reports_missing_credentials_as_failure() {
    let server = MockServer::start().await;
    mount_proofpoint(&server).await;
    // crowdstrike 비밀이 없음 → 404

    let args = FetchArgs {
        categories: vec!["detection".to_owned(), "email-threat".to_owned()],
        last: Some(30),
        pages: 1,
        ..FetchArgs::default()
    };
    let report = fetch::fetch_report(&args, &config(&server), &env())
        .await
        .unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].vendor, Vendor::CrowdStrike);
    assert_eq!(report.failures[0].kind, "credential_not_found");
}

#[tokio::test]
async fn fetch_rejects_unknown_category() {
    let server = MockServer::start().await;
    let args = FetchArgs {
        categories: vec!["syslog".to_owned()],
        ..FetchArgs::default()
    };
    let err = fetch::fetch_report(&args, &config(&server), &env())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn health_probes_each_category() {
    let server = MockServer::start().await;
    mount_proofpoint(&server).await;
    mount_crowdstrike_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/detects/queries/detects/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [],
            "meta": { "pagination": { "offset": 0, "limit": 1, "total": 0 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/incidents/queries/incidents/v1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let summary = health::probe(&HealthArgs::default(), &config(&server), &env())
        .await
        .unwrap();

    let names: Vec<_> = summary
        .vendors
        .iter()
        .flat_map(|r| r.categories.iter())
        .map(|c| (c.name.as_str(), c.status.is_healthy()))
        .collect();
    assert_eq!(
        names,
        [
            ("crowdstrike/detection", true),
            ("crowdstrike/incident", false),
            ("proofpoint/email-threat", true),
        ]
    );
    assert!(summary.status.is_unhealthy());
}

#[tokio::test]
async fn host_lookup_returns_details() {
    let server = MockServer::start().await;
    mount_crowdstrike_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices/queries/devices/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": ["dev-1"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/entities/devices/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{
                "device_id": "dev-1",
                "hostname": "ws-001",
                "platform_name": "Windows",
                "local_ip": "10.0.0.5"
            }]
        })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.proofpoint.enabled = false;
    let report = host::lookup("ws-001", &config, &env()).await.unwrap();

    let details = report.details.expect("host should be found");
    assert_eq!(details.device_id.as_deref(), Some("dev-1"));
    assert_eq!(details.platform_name.as_deref(), Some("Windows"));
}

#[tokio::test]
async fn intel_lookup_returns_matches() {
    let server = MockServer::start().await;
    mount_crowdstrike_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/intel/combined/indicators/v1"))
        .and(query_param("filter", "indicator:'evil.example.com'+type:'domain'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{
                "id": "domain_evil.example.com",
                "indicator": "evil.example.com",
                "type": "domain",
                "malicious_confidence": "high",
                "malware_families": ["Emotet"]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.proofpoint.enabled = false;
    let report = intel::lookup("evil.example.com", "domain", &config, &env())
        .await
        .unwrap();

    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].malware_families, ["Emotet"]);
}

#[tokio::test]
async fn vulns_for_host_use_two_step_lookup() {
    let server = MockServer::start().await;
    mount_crowdstrike_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/spotlight/queries/vulnerabilities/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": ["vuln-1"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spotlight/entities/vulnerabilities/v2"))
        .and(query_param("ids", "vuln-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{
                "id": "vuln-1",
                "status": "open",
                "cve": { "id": "CVE-2024-6387", "severity": "HIGH" },
                "host_info": { "hostname": "web-01" }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.proofpoint.enabled = false;
    let report = vulns::list(Some("web-01"), &config, &env()).await.unwrap();

    assert_eq!(report.hostname.as_deref(), Some("web-01"));
    assert_eq!(report.vulnerabilities.len(), 1);
    assert_eq!(
        report.vulnerabilities[0]
            .cve
            .as_ref()
            .and_then(|c| c.id.as_deref()),
        Some("CVE-2024-6387")
    );
}
