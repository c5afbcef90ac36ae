//! Azure Key Vault backend.

use std::time::Duration;

use secbridge_core::config::CloudConfig;
use secbridge_core::types::CloudProvider;
use serde::Deserialize;
use tracing::debug;

use super::{SecretFields, SecretStore, parse_payload, status_error, transport_error};
use crate::context::Environment;
use crate::error::SecretStoreError;

const STORE: CloudProvider = CloudProvider::Azure;
const API_VERSION: &str = "7.4";
const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// How the vault bearer token is obtained.
#[derive(Clone)]
pub enum AzureAuth {
    /// Client-credentials flow against the Azure AD authority.
    ServicePrincipal {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Managed identity through the instance metadata service.
    ManagedIdentity { endpoint: String },
}

impl std::fmt::Debug for AzureAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServicePrincipal {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::ManagedIdentity { endpoint } => f
                .debug_struct("ManagedIdentity")
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

/// Key Vault secrets client.
///
/// Key Vault names only allow alphanumerics and dashes, so `/` and `_` in a
/// logical name become `-`.
#[derive(Debug)]
pub struct AzureKeyVault {
    http: reqwest::Client,
    vault_url: String,
    auth: AzureAuth,
    timeout: Duration,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

impl AzureKeyVault {
    pub fn new(
        http: reqwest::Client,
        vault_url: impl Into<String>,
        auth: AzureAuth,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            vault_url: vault_url.into().trim_end_matches('/').to_owned(),
            auth,
            timeout,
        }
    }

    /// Uses the service principal from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
    /// and `AZURE_CLIENT_SECRET` when all three are set, managed identity
    /// otherwise.
    pub fn from_env(
        vault_url: &str,
        config: &CloudConfig,
        env: &Environment,
        http: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        let auth = match (
            env.get("AZURE_TENANT_ID"),
            env.get("AZURE_CLIENT_ID"),
            env.get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant), Some(client), Some(secret)) => AzureAuth::ServicePrincipal {
                authority: config.azure_authority.trim_end_matches('/').to_owned(),
                tenant_id: tenant.to_owned(),
                client_id: client.to_owned(),
                client_secret: secret.to_owned(),
            },
            _ => AzureAuth::ManagedIdentity {
                endpoint: config.azure_imds_endpoint.clone(),
            },
        };
        Self::new(http, vault_url, auth, timeout)
    }

    async fn vault_token(&self) -> Result<String, SecretStoreError> {
        let request = match &self.auth {
            AzureAuth::ServicePrincipal {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => self
                .http
                .post(format!("{authority}/{tenant_id}/oauth2/v2.0/token"))
                .form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", "https://vault.azure.net/.default"),
                ]),
            AzureAuth::ManagedIdentity { endpoint } => self
                .http
                .get(endpoint)
                .header("Metadata", "true")
                .query(&[("api-version", "2018-02-01"), ("resource", VAULT_RESOURCE)]),
        };

        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                400 | 401 | 403 => SecretStoreError::AccessDenied {
                    store: STORE,
                    status: status.as_u16(),
                },
                other => SecretStoreError::Unavailable {
                    store: STORE,
                    reason: format!("token endpoint returned {other}"),
                },
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            SecretStoreError::Unavailable {
                store: STORE,
                reason: format!("invalid token response: {e}"),
            }
        })?;
        Ok(token.access_token)
    }
}

impl SecretStore for AzureKeyVault {
    fn provider(&self) -> CloudProvider {
        STORE
    }

    fn native_name(&self, logical_name: &str) -> String {
        logical_name.replace(['/', '_'], "-")
    }

    async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
        let name = self.native_name(logical_name);
        let token = self.vault_token().await?;

        debug!(secret = %name, "reading secret from azure key vault");
        let response = self
            .http
            .get(format!("{}/secrets/{name}", self.vault_url))
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(STORE, &e))?;

        if let Some(err) = status_error(STORE, &name, response.status()) {
            return Err(err);
        }

        let bundle: SecretBundle =
            response
                .json()
                .await
                .map_err(|e| SecretStoreError::Malformed {
                    store: STORE,
                    name: name.clone(),
                    reason: format!("unexpected response: {e}"),
                })?;
        parse_payload(STORE, &name, &bundle.value)
    }
}
