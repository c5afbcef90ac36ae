//! 자격증명 브로커 통합 테스트
//!
//! - 감지된 클라우드 컨텍스트로 저장소 백엔드 구성
//! - 실제 HTTP(wiremock) 저장소에서 자격증명 해석
//! - 로테이션 후 무효화 → 재조회

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secbridge_core::config::BridgeConfig;
use secbridge_core::error::BridgeError;
use secbridge_core::types::{CloudProvider, Vendor};
use secbridge_credentials::{AnySecretStore, CloudContext, CredentialBroker, Environment, SecretStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CS_PATH: &str =
    "/v1/projects/sec-ops/secrets/crowdstrike-api-credentials-prod/versions/latest:access";

fn gcp_config(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.cloud.gcp_endpoint = server.uri();
    config
}

fn gcp_env() -> Environment {
    Environment::from_pairs([
        ("GOOGLE_CLOUD_PROJECT", "sec-ops"),
        ("GOOGLE_OAUTH_ACCESS_TOKEN", "static-token"),
    ])
}

fn secret_body(json: &str) -> serde_json::Value {
    serde_json::json!({ "payload": { "data": STANDARD.encode(json) } })
}

#[tokio::test]
async fn resolves_through_detected_gcp_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(secret_body(r#"{"client_id":"cid","client_secret":"cs"}"#)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let broker =
        CredentialBroker::from_environment(&gcp_config(&server), &gcp_env(), reqwest::Client::new())
            .expect("broker should build");
    assert_eq!(broker.provider(), CloudProvider::Gcp);

    let credential = broker.resolve(Vendor::CrowdStrike).await.expect("resolve");
    assert_eq!(credential.get("client_id"), Some("cid"));
    assert_eq!(credential.source(), CloudProvider::Gcp);

    // 두 번째 호출은 캐시에서 응답 (expect(1))
    broker.resolve(Vendor::CrowdStrike).await.expect("cached");
}

#[tokio::test]
async fn rotation_is_picked_up_after_invalidate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(secret_body(r#"{"client_id":"cid","client_secret":"old"}"#)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(secret_body(r#"{"client_id":"cid","client_secret":"new"}"#)),
        )
        .mount(&server)
        .await;

    let broker =
        CredentialBroker::from_environment(&gcp_config(&server), &gcp_env(), reqwest::Client::new())
            .expect("broker should build");

    let old = broker.resolve(Vendor::CrowdStrike).await.expect("resolve");
    assert_eq!(old.get("client_secret"), Some("old"));

    broker.invalidate(Vendor::CrowdStrike).await;
    let new = broker.resolve(Vendor::CrowdStrike).await.expect("resolve");
    assert_eq!(new.get("client_secret"), Some("new"));
}

#[tokio::test]
async fn missing_secret_maps_to_credential_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let broker =
        CredentialBroker::from_environment(&gcp_config(&server), &gcp_env(), reqwest::Client::new())
            .expect("broker should build");
    let err = broker.resolve(Vendor::Microsoft).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::CredentialNotFound {
            vendor: Vendor::Microsoft,
            ..
        }
    ));
}

#[tokio::test]
async fn store_outage_maps_to_store_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let broker =
        CredentialBroker::from_environment(&gcp_config(&server), &gcp_env(), reqwest::Client::new())
            .expect("broker should build");
    let err = broker.resolve(Vendor::Proofpoint).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::SecretStoreUnavailable {
            store: CloudProvider::Gcp,
            ..
        }
    ));
}

#[test]
fn native_names_differ_per_cloud() {
    let config = BridgeConfig::default();
    let env = Environment::from_pairs([
        ("AWS_ACCESS_KEY_ID", "AKID"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
    ]);
    let logical = Vendor::Microsoft.secret_name();

    let cases = [
        (
            CloudContext::Aws {
                region: "us-east-1".to_owned(),
            },
            "microsoft/api-credentials",
        ),
        (
            CloudContext::Azure {
                vault_url: "https://kv.vault.azure.net".to_owned(),
            },
            "microsoft-api-credentials",
        ),
        (
            CloudContext::Gcp {
                project: "p".to_owned(),
            },
            "microsoft-api-credentials-prod",
        ),
    ];

    for (context, expected) in cases {
        let store = AnySecretStore::from_context(
            &context,
            &config.cloud,
            &env,
            reqwest::Client::new(),
            config.http.request_timeout(),
        )
        .expect("store should build");
        assert_eq!(store.provider(), context.provider());
        assert_eq!(store.native_name(logical), expected);
    }
}
