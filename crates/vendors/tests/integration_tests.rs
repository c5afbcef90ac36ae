//! 통합 테스트 -- 자격증명 조회부터 정규화까지 전체 플로우 검증
//!
//! GCP Secret Manager와 벤더 API를 모두 wiremock으로 띄우고
//! `SecurityFacade`를 설정에서 그대로 구성합니다.
//!
//! - CrowdStrike 심각도 High 이상 조회
//! - 한 벤더 실패 시 나머지 벤더 결과 유지
//! - Proofpoint 시간 윈도우 분할
//! - Graph 401 반복 시 자격증명 재조회 후 AuthenticationFailed

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DurationRound, TimeDelta, Utc};
use secbridge_core::config::BridgeConfig;
use secbridge_core::error::BridgeError;
use secbridge_core::filter::EventFilter;
use secbridge_core::types::{EventCategory, Severity, Vendor};
use secbridge_credentials::{CredentialBroker, Environment};
use secbridge_vendors::{FetchItem, SecurityFacade};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn secret_path(vendor: &str) -> String {
    format!("/v1/projects/sec-ops/secrets/{vendor}-api-credentials-prod/versions/latest:access")
}

async fn mount_secret(server: &MockServer, vendor: &str, secret: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(secret_path(vendor)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": { "data": STANDARD.encode(secret.to_string()) }
        })))
        .mount(server)
        .await;
}

/// Every vendor disabled, everything pointed at `server`, fast retries.
fn config(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.cloud.gcp_endpoint = server.uri();
    config.http.max_attempts = 2;
    config.http.backoff_base_ms = 10;
    config.http.backoff_cap_ms = 100;
    config.crowdstrike.enabled = false;
    config.crowdstrike.base_url = server.uri();
    config.microsoft.enabled = false;
    config.microsoft.authority = server.uri();
    config.microsoft.graph_base_url = server.uri();
    config.proofpoint.enabled = false;
    config.proofpoint.base_url = server.uri();
    config
}

fn facade(config: &BridgeConfig) -> SecurityFacade {
    let http = reqwest::Client::new();
    let env = Environment::from_pairs([
        ("GOOGLE_CLOUD_PROJECT", "sec-ops"),
        ("GOOGLE_OAUTH_ACCESS_TOKEN", "static-token"),
    ]);
    let broker = CredentialBroker::from_environment(config, &env, http.clone()).unwrap();
    SecurityFacade::from_config(config, Arc::new(broker), http).unwrap()
}

async fn mount_crowdstrike(server: &MockServer) {
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
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/detects/queries/detects/v1"))
        .and(query_param(
            "filter",
            "max_severity_displayname:['High','Critical']",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": ["ldt:1", "ldt:2", "ldt:3"],
            "meta": { "pagination": { "offset": 0, "limit": 500, "total": 3 } }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/detects/entities/summaries/GET/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [
                {
                    "detection_id": "ldt:1",
                    "max_severity_displayname": "High",
                    "first_behavior": "2024-05-01T09:00:00Z",
                    "device": { "hostname": "ws-001" }
                },
                {
                    "detection_id": "ldt:2",
                    "max_severity_displayname": "Critical",
                    "first_behavior": "2024-05-01T09:05:00Z",
                    "device": { "hostname": "ws-002" }
                },
                {
                    "detection_id": "ldt:3",
                    "max_severity_displayname": "Low",
                    "first_behavior": "2024-05-01T09:10:00Z"
                }
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn crowdstrike_high_severity_end_to_end() {
    let server = MockServer::start().await;
    mount_crowdstrike(&server).await;
    let mut config = config(&server);
    config.crowdstrike.enabled = true;

    let filter = EventFilter::new().min_severity(Severity::High);
    let outcome = facade(&config)
        .fetch(&[EventCategory::Detection], &filter, 5)
        .collect()
        .await;

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.pages, 1);
    let ids: Vec<_> = outcome.events.iter().map(|e| e.native_id.as_str()).collect();
    assert_eq!(ids, ["ldt:1", "ldt:2"]);
    assert!(outcome.events.iter().all(|e| e.severity >= Severity::High));
    assert!(outcome.events.iter().all(|e| e.source == Vendor::CrowdStrike));
    assert_eq!(
        outcome.events[1].entity.as_ref().map(|e| e.identifier.as_str()),
        Some("ws-002")
    );
}

#[tokio::test]
async fn failing_vendor_does_not_abort_others() {
    let server = MockServer::start().await;
    mount_crowdstrike(&server).await;
    mount_secret(
        &server,
        "proofpoint",
        json!({ "service_principal": "sp", "secret": "pp-secret" }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/siem/all"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.crowdstrike.enabled = true;
    config.proofpoint.enabled = true;
    let filter = EventFilter::new().min_severity(Severity::High);

    let mut stream = facade(&config).fetch(
        &[EventCategory::Detection, EventCategory::EmailThreat],
        &filter,
        5,
    );
    assert_eq!(stream.stream_count(), 2);

    let mut events = 0;
    let mut failures = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            FetchItem::Page { vendor, page, .. } => {
                assert_eq!(vendor, Vendor::CrowdStrike);
                events += page.events.len();
            }
            FetchItem::Failure(failure) => failures.push(failure),
        }
    }

    assert_eq!(events, 2);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].vendor, Vendor::Proofpoint);
    assert_eq!(failures[0].category, EventCategory::EmailThreat);
    assert!(matches!(
        failures[0].error,
        BridgeError::Exhausted {
            attempts: 2,
            last_status: Some(503),
            ..
        }
    ));
}

#[tokio::test]
async fn proofpoint_range_is_split_into_windows() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        "proofpoint",
        json!({ "service_principal": "sp", "secret": "pp-secret" }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/siem/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messagesDelivered": [{
                "GUID": "m1",
                "messageTime": "2024-05-01T00:00:00Z",
                "recipient": ["choi@example.com"],
                "threatsInfoMap": [{ "classification": "phish" }]
            }],
            "clicksPermitted": []
        })))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.proofpoint.enabled = true;
    config.proofpoint.max_window_secs = 3600;

    let end = Utc::now().duration_trunc(TimeDelta::hours(1)).unwrap();
    let start = end - TimeDelta::minutes(150);
    let filter = EventFilter::new().since(start).until(end);

    let outcome = facade(&config)
        .fetch(&[EventCategory::EmailThreat], &filter, 10)
        .collect()
        .await;

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.events.len(), 3);
    assert!(outcome.events.iter().all(|e| e.severity == Severity::High));
}

#[tokio::test]
async fn probe_reports_per_vendor_health() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        "proofpoint",
        json!({ "service_principal": "sp", "secret": "pp-secret" }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/siem/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    // microsoft 자격증명이 없음 → CredentialNotFound → unhealthy

    let mut config = config(&server);
    config.proofpoint.enabled = true;
    config.microsoft.enabled = true;

    let summary = facade(&config).probe(&[]).await;

    assert!(summary.status.is_unhealthy());
    let proofpoint = summary
        .vendors
        .iter()
        .find(|r| r.vendor == Vendor::Proofpoint)
        .unwrap();
    assert!(proofpoint.status.is_healthy());
    let microsoft = summary
        .vendors
        .iter()
        .find(|r| r.vendor == Vendor::Microsoft)
        .unwrap();
    assert_eq!(microsoft.categories.len(), 2);
    assert!(microsoft.status.is_unhealthy());
}

#[tokio::test]
async fn rejected_identity_suite_fails_after_one_credential_reread() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/detects/queries/detects/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": ["ldt:9"],
            "meta": { "pagination": { "offset": 0, "limit": 100, "total": 1 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/detects/entities/summaries/GET/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resources": [{
                "detection_id": "ldt:9",
                "max_severity_displayname": "Medium",
                "first_behavior": "2024-05-01T09:00:00Z"
            }]
        })))
        .mount(&server)
        .await;
    mount_secret(
        &server,
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
        .mount(&server)
        .await;

    // 무효화 후 비밀 저장소를 다시 읽어야 하므로 정확히 두 번
    Mock::given(method("GET"))
        .and(path(secret_path("microsoft")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": { "data": STANDARD.encode(json!({
                "tenant_id": "tenant",
                "client_id": "ms-id",
                "client_secret": "ms-secret"
            }).to_string()) }
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "revoked-token"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/identityProtection/riskyUsers"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.crowdstrike.enabled = true;
    config.microsoft.enabled = true;

    let outcome = facade(&config)
        .fetch(
            &[EventCategory::Detection, EventCategory::IdentityRisk],
            &EventFilter::new(),
            1,
        )
        .collect()
        .await;

    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].source, Vendor::CrowdStrike);
    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.vendor, Vendor::Microsoft);
    assert_eq!(failure.category, EventCategory::IdentityRisk);
    assert_eq!(failure.pages_fetched, 0);
    assert!(matches!(failure.error, BridgeError::AuthenticationFailed { .. }));
    assert_eq!(failure.error.kind(), "authentication_failed");
}
