//! GCP Secret Manager backend.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secbridge_core::config::CloudConfig;
use secbridge_core::types::CloudProvider;
use serde::Deserialize;
use tracing::debug;

use super::{SecretFields, SecretStore, parse_payload, status_error, transport_error};
use crate::context::Environment;
use crate::error::SecretStoreError;

const STORE: CloudProvider = CloudProvider::Gcp;

/// How the Secret Manager bearer token is obtained.
#[derive(Clone)]
pub enum GcpAuth {
    /// A pre-issued OAuth access token.
    StaticToken(String),
    /// The compute metadata server.
    Metadata { url: String },
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticToken(_) => f.write_str("StaticToken(..)"),
            Self::Metadata { url } => f.debug_struct("Metadata").field("url", url).finish(),
        }
    }
}

/// Secret Manager client reading the `latest` version.
///
/// Native names replace `/` with `-` and append the configured suffix.
#[derive(Debug)]
pub struct GcpSecretManager {
    http: reqwest::Client,
    endpoint: String,
    project: String,
    suffix: String,
    auth: GcpAuth,
    timeout: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Deserialize)]
struct Payload {
    data: String,
}

impl GcpSecretManager {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        project: impl Into<String>,
        suffix: impl Into<String>,
        auth: GcpAuth,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            project: project.into(),
            suffix: suffix.into(),
            auth,
            timeout,
        }
    }

    /// Uses `GOOGLE_OAUTH_ACCESS_TOKEN` when set, the metadata server otherwise.
    pub fn from_env(
        project: &str,
        config: &CloudConfig,
        env: &Environment,
        http: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        let auth = match env.get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            Some(token) => GcpAuth::StaticToken(token.to_owned()),
            None => GcpAuth::Metadata {
                url: config.gcp_metadata_url.clone(),
            },
        };
        Self::new(
            http,
            config.gcp_endpoint.clone(),
            project,
            config.gcp_secret_suffix.clone(),
            auth,
            timeout,
        )
    }

    async fn access_token(&self) -> Result<String, SecretStoreError> {
        let url = match &self.auth {
            GcpAuth::StaticToken(token) => return Ok(token.clone()),
            GcpAuth::Metadata { url } => url,
        };

        let response = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SecretStoreError::Unavailable {
                store: STORE,
                reason: format!("metadata server returned {status}"),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            SecretStoreError::Unavailable {
                store: STORE,
                reason: format!("invalid metadata token response: {e}"),
            }
        })?;
        Ok(token.access_token)
    }
}

impl SecretStore for GcpSecretManager {
    fn provider(&self) -> CloudProvider {
        STORE
    }

    fn native_name(&self, logical_name: &str) -> String {
        format!("{}{}", logical_name.replace('/', "-"), self.suffix)
    }

    async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
        let name = self.native_name(logical_name);
        let token = self.access_token().await?;

        debug!(secret = %name, project = %self.project, "reading secret from gcp secret manager");
        let response = self
            .http
            .get(format!(
                "{}/v1/projects/{}/secrets/{name}/versions/latest:access",
                self.endpoint, self.project
            ))
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        if let Some(err) = status_error(STORE, &name, response.status()) {
            return Err(err);
        }

        let malformed = |reason: String| SecretStoreError::Malformed {
            store: STORE,
            name: name.clone(),
            reason,
        };
        let access: AccessResponse = response
            .json()
            .await
            .map_err(|e| malformed(format!("unexpected response: {e}")))?;
        let bytes = STANDARD
            .decode(access.payload.data.as_bytes())
            .map_err(|e| malformed(format!("payload is not base64: {e}")))?;
        let text =
            String::from_utf8(bytes).map_err(|e| malformed(format!("payload is not UTF-8: {e}")))?;

        parse_payload(STORE, &name, &text)
    }
}
