//! Cloud context detection.
//!
//! The active cloud is decided once at startup from deployment markers and
//! carried as an explicit [`CloudContext`] value. Nothing below this module
//! reads process environment directly; tests build an [`Environment`] from
//! literal pairs.

use std::collections::BTreeMap;

use secbridge_core::config::CloudConfig;
use secbridge_core::error::{BridgeError, ConfigError};
use secbridge_core::types::CloudProvider;
use tracing::{debug, info};

/// Environment variables consulted by detection and by the store backends.
pub const KNOWN_VARS: &[&str] = &[
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AZURE_SUBSCRIPTION_ID",
    "AZURE_TENANT_ID",
    "AZURE_CLIENT_ID",
    "AZURE_CLIENT_SECRET",
    "AZURE_KEY_VAULT_URL",
    "GOOGLE_CLOUD_PROJECT",
    "GCP_PROJECT",
    "GOOGLE_OAUTH_ACCESS_TOKEN",
];

const AWS_MARKERS: &[&str] = &["AWS_REGION", "AWS_DEFAULT_REGION"];
const AZURE_MARKERS: &[&str] = &["AZURE_SUBSCRIPTION_ID", "AZURE_TENANT_ID"];
const GCP_MARKERS: &[&str] = &["GOOGLE_CLOUD_PROJECT", "GCP_PROJECT"];

/// Snapshot of the deployment environment.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures [`KNOWN_VARS`] from the process environment.
    pub fn capture() -> Self {
        Self::from_pairs(
            KNOWN_VARS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|val| (*key, val))),
        )
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// First non-empty value among `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

/// The cloud whose secret store holds the vendor credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudContext {
    Aws { region: String },
    Azure { vault_url: String },
    Gcp { project: String },
}

impl CloudContext {
    pub fn provider(&self) -> CloudProvider {
        match self {
            Self::Aws { .. } => CloudProvider::Aws,
            Self::Azure { .. } => CloudProvider::Azure,
            Self::Gcp { .. } => CloudProvider::Gcp,
        }
    }

    /// Detects the cloud context.
    ///
    /// With `provider = "auto"` the markers are checked in the order AWS,
    /// Azure, GCP and the first match wins. An explicit provider skips
    /// detection but still needs that cloud's location markers. No marker
    /// at all is a configuration error and is never retried.
    pub fn detect(config: &CloudConfig, env: &Environment) -> Result<Self, BridgeError> {
        let provider = match config.provider.as_str() {
            "auto" => detect_provider(env)?,
            other => CloudProvider::from_str_loose(other).ok_or_else(|| {
                ConfigError::InvalidValue {
                    field: "cloud.provider".to_owned(),
                    reason: format!("unknown provider '{other}'"),
                }
            })?,
        };

        let context = match provider {
            CloudProvider::Aws => Self::Aws {
                region: require(env, AWS_MARKERS)?.to_owned(),
            },
            CloudProvider::Azure => Self::Azure {
                vault_url: require(env, &["AZURE_KEY_VAULT_URL"])?
                    .trim_end_matches('/')
                    .to_owned(),
            },
            CloudProvider::Gcp => Self::Gcp {
                project: require(env, GCP_MARKERS)?.to_owned(),
            },
        };

        info!(cloud = %context.provider(), "cloud context detected");
        Ok(context)
    }
}

fn detect_provider(env: &Environment) -> Result<CloudProvider, BridgeError> {
    for (provider, markers) in [
        (CloudProvider::Aws, AWS_MARKERS),
        (CloudProvider::Azure, AZURE_MARKERS),
        (CloudProvider::Gcp, GCP_MARKERS),
    ] {
        if let Some(marker) = markers.iter().find(|m| env.get(m).is_some()) {
            debug!(cloud = %provider, marker, "deployment marker found");
            return Ok(provider);
        }
    }

    let all: Vec<&str> = AWS_MARKERS
        .iter()
        .chain(AZURE_MARKERS)
        .chain(GCP_MARKERS)
        .copied()
        .collect();
    Err(ConfigError::CloudNotDetected {
        markers: all.join(", "),
    }
    .into())
}

fn require<'a>(env: &'a Environment, keys: &[&str]) -> Result<&'a str, BridgeError> {
    env.first_of(keys).ok_or_else(|| {
        ConfigError::InvalidValue {
            field: keys.join(" | "),
            reason: "required environment variable is not set".to_owned(),
        }
        .into()
    })
}
