//! Credential broker.
//!
//! Resolves a vendor's raw API credential from the active secret store and
//! keeps it in memory until invalidated. Invalidation is how rotation is
//! picked up without a restart: the next `resolve` re-reads the store.

use std::collections::HashMap;
use std::sync::Arc;

use secbridge_core::config::BridgeConfig;
use secbridge_core::credential::Credential;
use secbridge_core::error::BridgeError;
use secbridge_core::metrics as m;
use secbridge_core::types::{CloudProvider, Vendor};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::context::{CloudContext, Environment};
use crate::store::{AnySecretStore, SecretStore};

/// Resolves and caches vendor credentials.
///
/// Credentials are only ever held in memory and are handed out as
/// `Arc<Credential>`; a rotation replaces the whole value.
pub struct CredentialBroker<S: SecretStore = AnySecretStore> {
    store: S,
    cache: RwLock<HashMap<Vendor, Arc<Credential>>>,
}

impl CredentialBroker<AnySecretStore> {
    /// Detects the cloud context and builds the matching store backend.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Config`: no deployment marker, or a marker without
    ///   the location it needs
    /// - `BridgeError::SecretStoreUnavailable`: the store's own credentials
    ///   are missing from the environment
    pub fn from_environment(
        config: &BridgeConfig,
        env: &Environment,
        http: reqwest::Client,
    ) -> Result<Self, BridgeError> {
        let context = CloudContext::detect(&config.cloud, env)?;
        let store = AnySecretStore::from_context(
            &context,
            &config.cloud,
            env,
            http,
            config.http.request_timeout(),
        )
        .map_err(|e| BridgeError::SecretStoreUnavailable {
            store: e.store(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(store))
    }
}

impl<S: SecretStore> CredentialBroker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> CloudProvider {
        self.store.provider()
    }

    /// Returns the vendor's credential, reading the store on a cache miss.
    ///
    /// # Errors
    ///
    /// - `BridgeError::CredentialNotFound`: secret missing, malformed, or
    ///   lacking a required field
    /// - `BridgeError::SecretStoreUnavailable`: the store could not be read
    pub async fn resolve(&self, vendor: Vendor) -> Result<Arc<Credential>, BridgeError> {
        if let Some(cached) = self.cache.read().await.get(&vendor) {
            return Ok(Arc::clone(cached));
        }

        let provider = self.store.provider();
        let logical_name = vendor.secret_name();
        debug!(
            vendor = %vendor,
            cloud = %provider,
            secret = %self.store.native_name(logical_name),
            "resolving credential"
        );

        let fields = match self.store.fetch_secret(logical_name).await {
            Ok(fields) => fields,
            Err(e) => {
                metrics::counter!(
                    m::CREDENTIAL_FETCHES_TOTAL,
                    m::LABEL_CLOUD => provider.as_str(),
                    m::LABEL_RESULT => "failure"
                )
                .increment(1);
                warn!(vendor = %vendor, cloud = %provider, error = %e, "credential fetch failed");
                return Err(e.into_bridge(vendor));
            }
        };

        let credential = Arc::new(Credential::new(vendor, fields, provider)?);
        metrics::counter!(
            m::CREDENTIAL_FETCHES_TOTAL,
            m::LABEL_CLOUD => provider.as_str(),
            m::LABEL_RESULT => "success"
        )
        .increment(1);
        info!(vendor = %vendor, cloud = %provider, "credential resolved");

        self.cache
            .write()
            .await
            .insert(vendor, Arc::clone(&credential));
        Ok(credential)
    }

    /// Drops the cached credential so the next `resolve` re-reads the store.
    pub async fn invalidate(&self, vendor: Vendor) {
        if self.cache.write().await.remove(&vendor).is_some() {
            info!(vendor = %vendor, "credential invalidated");
        }
    }

    /// Whether a credential for `vendor` is currently cached.
    pub async fn is_cached(&self, vendor: Vendor) -> bool {
        self.cache.read().await.contains_key(&vendor)
    }
}
