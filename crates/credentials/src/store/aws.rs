//! AWS Secrets Manager backend.

use std::time::Duration;

use chrono::Utc;
use secbridge_core::config::CloudConfig;
use secbridge_core::types::CloudProvider;
use serde::Deserialize;
use tracing::debug;

use super::{SecretFields, SecretStore, parse_payload, status_error, transport_error};
use crate::context::Environment;
use crate::error::SecretStoreError;
use crate::sigv4::{AwsKeys, SigV4Signer, SignableRequest};

const STORE: CloudProvider = CloudProvider::Aws;
const TARGET: &str = "secretsmanager.GetSecretValue";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Secrets Manager client using `GetSecretValue` over the JSON protocol.
///
/// Logical names are used verbatim as `SecretId`.
#[derive(Debug)]
pub struct AwsSecretsManager {
    http: reqwest::Client,
    endpoint: String,
    host: String,
    signer: SigV4Signer,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GetSecretValueResponse {
    #[serde(rename = "SecretString")]
    secret_string: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
}

impl AwsSecretsManager {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        region: impl Into<String>,
        keys: AwsKeys,
        timeout: Duration,
    ) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_owned();
        let host = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest)
            .to_owned();
        Self {
            http,
            endpoint,
            host,
            signer: SigV4Signer::new(keys, region, "secretsmanager"),
            timeout,
        }
    }

    /// Builds the client from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
    /// and optional `AWS_SESSION_TOKEN`.
    pub fn from_env(
        region: &str,
        config: &CloudConfig,
        env: &Environment,
        http: reqwest::Client,
        timeout: Duration,
    ) -> Result<Self, SecretStoreError> {
        let var = |name: &'static str| {
            env.get(name)
                .map(str::to_owned)
                .ok_or(SecretStoreError::MissingEnvironment { store: STORE, var: name })
        };
        let keys = AwsKeys {
            access_key_id: var("AWS_ACCESS_KEY_ID")?,
            secret_access_key: var("AWS_SECRET_ACCESS_KEY")?,
            session_token: env.get("AWS_SESSION_TOKEN").map(str::to_owned),
        };
        let endpoint = if config.aws_endpoint.is_empty() {
            format!("https://secretsmanager.{region}.amazonaws.com")
        } else {
            config.aws_endpoint.clone()
        };
        Ok(Self::new(http, endpoint, region, keys, timeout))
    }
}

impl SecretStore for AwsSecretsManager {
    fn provider(&self) -> CloudProvider {
        STORE
    }

    fn native_name(&self, logical_name: &str) -> String {
        logical_name.to_owned()
    }

    async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
        let name = self.native_name(logical_name);
        let body = serde_json::json!({ "SecretId": name }).to_string();

        let signed = self.signer.sign(
            &SignableRequest {
                method: "POST",
                host: &self.host,
                path: "/",
                headers: &[("content-type", CONTENT_TYPE), ("x-amz-target", TARGET)],
                payload: body.as_bytes(),
            },
            Utc::now(),
        )?;

        let mut request = self
            .http
            .post(format!("{}/", self.endpoint))
            .timeout(self.timeout)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET);
        for (key, value) in signed {
            request = request.header(key, value);
        }

        debug!(secret = %name, "reading secret from aws secrets manager");
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        // Secrets Manager reports a missing secret as 400 ResourceNotFoundException.
        if status.as_u16() == 400 {
            let error_type = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error_type)
                .unwrap_or_default();
            if error_type.ends_with("ResourceNotFoundException") {
                return Err(SecretStoreError::NotFound { store: STORE, name });
            }
            return Err(SecretStoreError::Unavailable {
                store: STORE,
                reason: format!("status 400 {error_type}"),
            });
        }
        if let Some(err) = status_error(STORE, &name, status) {
            return Err(err);
        }

        let parsed: GetSecretValueResponse =
            serde_json::from_str(&text).map_err(|e| SecretStoreError::Malformed {
                store: STORE,
                name: name.clone(),
                reason: format!("unexpected response: {e}"),
            })?;
        let secret = parsed.secret_string.ok_or_else(|| SecretStoreError::Malformed {
            store: STORE,
            name: name.clone(),
            reason: "SecretString is missing (binary secrets are not supported)".to_owned(),
        })?;

        parse_payload(STORE, &name, &secret)
    }
}
