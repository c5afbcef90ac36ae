//! Integration tests for `secbridge config`.
//!
//! Validation and display against real TOML files.

use std::fs;

use secbridge_cli::commands::config::{show_report, validation_report};
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("secbridge.toml");
    fs::write(&path, contents).expect("should write config");
    path
}

#[tokio::test]
async fn valid_config_lists_enabled_vendors() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_config(
        &dir,
        r#"
[general]
log_level = "debug"
log_format = "json"

[cloud]
provider = "gcp"

[microsoft]
enabled = false
"#,
    );

    let report = validation_report(&path).await;

    assert!(report.valid, "errors: {:?}", report.errors);
    assert_eq!(report.enabled_vendors, ["crowdstrike", "proofpoint"]);
}

#[tokio::test]
async fn malformed_toml_is_invalid() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_config(&dir, "[general\nlog_level = \"info\"\n");

    let report = validation_report(&path).await;

    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn all_vendors_disabled_is_invalid() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_config(
        &dir,
        r#"
[crowdstrike]
enabled = false

[microsoft]
enabled = false

[proofpoint]
enabled = false
"#,
    );

    let report = validation_report(&path).await;

    assert!(!report.valid);
}

#[tokio::test]
async fn missing_file_is_invalid() {
    let report = validation_report(std::path::Path::new("/nonexistent/secbridge.toml")).await;
    assert!(!report.valid);
    assert!(report.errors[0].contains("/nonexistent/secbridge.toml"));
}

#[tokio::test]
async fn show_reflects_file_values() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = write_config(
        &dir,
        r#"
[proofpoint]
max_window_secs = 1800
"#,
    );
    let config = secbridge_core::config::BridgeConfig::from_file(&path)
        .await
        .expect("config should load");

    let report = show_report(&config, &path, Some("proofpoint")).expect("known section");

    assert!(report.config_toml.contains("max_window_secs = 1800"));
}
