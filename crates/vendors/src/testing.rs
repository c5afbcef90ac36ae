//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secbridge_core::config::RateLimitConfig;
use secbridge_core::types::{CloudProvider, Vendor};
use secbridge_credentials::store::SecretFields;
use secbridge_credentials::{CredentialBroker, SecretStore, SecretStoreError};

use crate::http::VendorHttp;
use crate::rate_limit::{BackoffPolicy, RateLimiter};
use crate::token_cache::TokenCache;

/// In-memory secret store holding a credential for every vendor.
#[derive(Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, SecretFields>>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn with_all_vendors() -> Self {
        let store = Self::default();
        store.put(
            "crowdstrike/api-credentials",
            &[("client_id", "cs-id"), ("client_secret", "cs-secret")],
        );
        store.put(
            "microsoft/api-credentials",
            &[
                ("tenant_id", "tenant"),
                ("client_id", "ms-id"),
                ("client_secret", "ms-secret"),
            ],
        );
        store.put(
            "proofpoint/api-credentials",
            &[("service_principal", "sp"), ("secret", "pp-secret")],
        );
        store
    }

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

impl SecretStore for MemoryStore {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Gcp
    }

    fn native_name(&self, logical_name: &str) -> String {
        logical_name.to_owned()
    }

    async fn fetch_secret(&self, logical_name: &str) -> Result<SecretFields, SecretStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .ok()
            .and_then(|secrets| secrets.get(logical_name).cloned())
            .ok_or_else(|| SecretStoreError::NotFound {
                store: CloudProvider::Gcp,
                name: logical_name.to_owned(),
            })
    }
}

pub fn broker() -> Arc<CredentialBroker<MemoryStore>> {
    Arc::new(CredentialBroker::new(MemoryStore::with_all_vendors()))
}

/// Generous budgets and a short backoff so retries stay fast.
pub fn limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        BackoffPolicy {
            base: Duration::from_millis(10),
            cap: Duration::from_secs(5),
            max_attempts: 3,
        },
        Vendor::ALL.map(|v| {
            (
                v,
                RateLimitConfig {
                    calls: 1000,
                    window_secs: 60,
                },
            )
        }),
    ))
}

pub fn token_cache() -> Arc<TokenCache<MemoryStore>> {
    Arc::new(TokenCache::new(
        broker(),
        limiter(),
        Duration::from_secs(60),
        Duration::from_secs(5),
    ))
}

pub fn vendor_http(vendor: Vendor) -> VendorHttp<MemoryStore> {
    VendorHttp::new(
        vendor,
        reqwest::Client::new(),
        token_cache(),
        Duration::from_secs(5),
    )
}
