//! Logging initialization for the secbridge CLI.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `BridgeConfig`. Logs go to stderr so `--output json` stays parseable.

use std::path::Path;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use secbridge_core::config::{BridgeConfig, GeneralConfig};

/// Reads `[general]` from the config file for logging setup.
///
/// Falls back to defaults when the file is missing or invalid; the command
/// itself reports those errors afterwards. `level_override` wins over the file.
pub async fn general_config(path: &Path, level_override: Option<&str>) -> GeneralConfig {
    let mut general = match tokio::fs::read_to_string(path).await {
        Ok(content) => BridgeConfig::parse(&content)
            .map(|config| config.general)
            .unwrap_or_default(),
        Err(_) => GeneralConfig::default(),
    };
    if let Some(level) = level_override {
        general.log_level = level.to_owned();
    }
    general
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable colored output (default)
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            ));
        }
    }

    Ok(())
}
