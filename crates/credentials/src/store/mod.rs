//! Secret store backends.
//!
//! Every backend answers the same question, "fetch the secret blob stored
//! under this logical name", and differs only in transport, authentication
//! and native naming. The blob is always a flat JSON object of string fields.

mod aws;
mod azure;
mod gcp;

use std::collections::BTreeMap;
use std::time::Duration;

use secbridge_core::config::CloudConfig;
use secbridge_core::types::CloudProvider;
use serde_json::Value;

pub use aws::AwsSecretsManager;
pub use azure::AzureKeyVault;
pub use gcp::GcpSecretManager;

use crate::context::{CloudContext, Environment};
use crate::error::SecretStoreError;

/// Secret fields keyed by name.
pub type SecretFields = BTreeMap<String, String>;

/// Read access to one cloud secret store.
///
/// Implementations must be `Send + Sync + 'static` so a single store can be
/// shared by the broker across tasks.
pub trait SecretStore: Send + Sync + 'static {
    /// Which cloud this store belongs to.
    fn provider(&self) -> CloudProvider;

    /// Maps a logical name (`crowdstrike/api-credentials`) to the store's
    /// native secret name.
    fn native_name(&self, logical_name: &str) -> String;

    /// Fetches and decodes the secret stored under `logical_name`.
    ///
    /// # Errors
    ///
    /// - `SecretStoreError::NotFound`: the secret does not exist
    /// - `SecretStoreError::Malformed`: the payload is not a flat JSON object
    /// - `SecretStoreError::AccessDenied` / `Unavailable`: the store refused
    ///   the call or could not be reached
    fn fetch_secret(
        &self,
        logical_name: &str,
    ) -> impl Future<Output = Result<SecretFields, SecretStoreError>> + Send;
}

/// The store backend selected by the detected [`CloudContext`].
#[derive(Debug)]
pub enum AnySecretStore {
    Aws(AwsSecretsManager),
    Azure(AzureKeyVault),
    Gcp(GcpSecretManager),
}

impl AnySecretStore {
    /// Builds the backend for `context`.
    ///
    /// AWS needs static keys in the environment. Azure uses service-principal
    /// credentials when present and falls back to managed identity. GCP uses
    /// `GOOGLE_OAUTH_ACCESS_TOKEN` when present and falls back to the
    /// metadata server.
    pub fn from_context(
        context: &CloudContext,
        config: &CloudConfig,
        env: &Environment,
        http: reqwest::Client,
        timeout: Duration,
    ) -> Result<Self, SecretStoreError> {
        Ok(match context {
            CloudContext::Aws { region } => {
                Self::Aws(AwsSecretsManager::from_env(region, config, env, http, timeout)?)
            }
            CloudContext::Azure { vault_url } => {
                Self::Azure(AzureKeyVault::from_env(vault_url, config, env, http, timeout))
            }
            CloudContext::Gcp { project } => {
                Self::Gcp(GcpSecretManager::from_env(project, config, env, http, timeout))
            }
        })
    }
}

impl SecretStore for AnySecretStore {
    fn provider(&self) -> CloudProvider {
        match self {
            Self::Aws(s) => s.provider(),
            Self::Azure(s) => s.provider(),
            Self::Gcp(s) => s.provider(),
        }
    }

    fn native_name(&self, logical_name: &str) -> String {
        match self {
            Self::Aws(s) => s.native_name(logical_name),
            Self::Azure(s) => s.native_name(logical_name),
            Self::Gcp(s) => s.native_name(logical_name),
        }
    }

    async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
        match self {
            Self::Aws(s) => s.fetch_secret(logical_name).await,
            Self::Azure(s) => s.fetch_secret(logical_name).await,
            Self::Gcp(s) => s.fetch_secret(logical_name).await,
        }
    }
}

/// Decodes a secret payload into string fields.
///
/// Numbers and booleans are accepted and stringified; nested values are not.
pub(crate) fn parse_payload(
    store: CloudProvider,
    name: &str,
    payload: &str,
) -> Result<SecretFields, SecretStoreError> {
    let malformed = |reason: String| SecretStoreError::Malformed {
        store,
        name: name.to_owned(),
        reason,
    };

    let value: Value =
        serde_json::from_str(payload).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(malformed("payload is not a JSON object".to_owned()));
    };

    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            Value::Number(n) => Ok((key, n.to_string())),
            Value::Bool(b) => Ok((key, b.to_string())),
            _ => Err(malformed(format!("field '{key}' is not a scalar"))),
        })
        .collect()
}

/// Maps a store HTTP status to an error. `None` means success.
pub(crate) fn status_error(
    store: CloudProvider,
    name: &str,
    status: reqwest::StatusCode,
) -> Option<SecretStoreError> {
    match status.as_u16() {
        200..=299 => None,
        404 => Some(SecretStoreError::NotFound {
            store,
            name: name.to_owned(),
        }),
        401 | 403 => Some(SecretStoreError::AccessDenied {
            store,
            status: status.as_u16(),
        }),
        other => Some(SecretStoreError::Unavailable {
            store,
            reason: format!("unexpected status {other}"),
        }),
    }
}

pub(crate) fn transport_error(store: CloudProvider, err: &reqwest::Error) -> SecretStoreError {
    let reason = if err.is_timeout() {
        "request timed out".to_owned()
    } else {
        err.to_string()
    };
    SecretStoreError::Unavailable { store, reason }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory store with configurable secrets and failures.
    #[derive(Default)]
    pub struct MockSecretStore {
        secrets: Mutex<HashMap<String, SecretFields>>,
        unavailable: bool,
        pub calls: AtomicUsize,
    }

    impl MockSecretStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_secret(self, logical_name: &str, fields: &[(&str, &str)]) -> Self {
            self.put(logical_name, fields);
            self
        }

        pub fn with_unavailable(mut self) -> Self {
            self.unavailable = true;
            self
        }

        /// Replaces a secret, simulating rotation.
        pub fn put(&self, logical_name: &str, fields: &[(&str, &str)]) {
            let fields = fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect();
            if let Ok(mut secrets) = self.secrets.lock() {
                secrets.insert(logical_name.to_owned(), fields);
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SecretStore for MockSecretStore {
        fn provider(&self) -> CloudProvider {
            CloudProvider::Aws
        }

        fn native_name(&self, logical_name: &str) -> String {
            logical_name.to_owned()
        }

        async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(SecretStoreError::Unavailable {
                    store: CloudProvider::Aws,
                    reason: "mock outage".to_owned(),
                });
            }
            self.secrets
                .lock()
                .ok()
                .and_then(|s| s.get(logical_name).cloned())
                .ok_or_else(|| SecretStoreError::NotFound {
                    store: CloudProvider::Aws,
                    name: logical_name.to_owned(),
                })
        }
    }
}
