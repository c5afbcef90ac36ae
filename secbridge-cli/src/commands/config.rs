//! `secbridge config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use secbridge_core::config::BridgeConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &str = "general, cloud, http, crowdstrike, microsoft, proofpoint";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads and validates the configuration file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values,
/// no vendor enabled).
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = validation_report(config_path).await;
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

pub async fn validation_report(config_path: &Path) -> ConfigValidationReport {
    let source = config_path.display().to_string();
    match BridgeConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport {
            source,
            valid: true,
            enabled_vendors: secbridge_core::types::Vendor::ALL
                .into_iter()
                .filter(|v| config.vendor_enabled(*v))
                .map(|v| v.as_str().to_owned())
                .collect(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source,
            valid: false,
            enabled_vendors: Vec::new(),
            errors: vec![e.to_string()],
        },
    }
}

/// Displays the effective configuration (file + env overrides + defaults).
///
/// The configuration holds secret-store locations only, never secret values,
/// so it is shown unredacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = BridgeConfig::load(config_path).await?;
    let report = show_report(&config, config_path, section.as_deref())?;
    writer.render(&report)?;
    Ok(())
}

pub fn show_report(
    config: &BridgeConfig,
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let rendered = match section {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("cloud") => toml::to_string_pretty(&config.cloud),
        Some("http") => toml::to_string_pretty(&config.http),
        Some("crowdstrike") => toml::to_string_pretty(&config.crowdstrike),
        Some("microsoft") => toml::to_string_pretty(&config.microsoft),
        Some("proofpoint") => toml::to_string_pretty(&config.proofpoint),
        Some(other) => {
            return Err(CliError::Usage(format!(
                "unknown section: {other} (expected: {SECTIONS})"
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml: rendered.unwrap_or_else(|e| format!("(serialization error: {e})")),
    })
}

/// Configuration display report.
///
/// `config_toml` is skipped in JSON output (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match &self.section {
            Some(section) => writeln!(w, "# {} [{}]", self.source, section)?,
            None => writeln!(w, "# {}", self.source)?,
        }
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub enabled_vendors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.valid {
            writeln!(w, "{} {}", "valid".green().bold(), self.source)?;
            writeln!(w, "  enabled vendors: {}", self.enabled_vendors.join(", "))?;
        } else {
            writeln!(w, "{} {}", "invalid".red().bold(), self.source)?;
            for e in &self.errors {
                writeln!(w, "  {e}")?;
            }
        }
        Ok(())
    }
}
