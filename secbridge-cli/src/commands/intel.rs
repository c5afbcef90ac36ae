//! `secbridge intel` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use secbridge_core::config::BridgeConfig;
use secbridge_credentials::Environment;
use secbridge_vendors::{IndicatorType, IntelIndicator};

use super::{connect, endpoint_client, require_crowdstrike};
use crate::cli::IntelArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `intel` command. No match is not an error.
pub async fn execute(
    args: &IntelArgs,
    config: &BridgeConfig,
    env: &Environment,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = lookup(&args.indicator, &args.indicator_type, config, env).await?;
    writer.render(&report)?;
    Ok(())
}

pub async fn lookup(
    indicator: &str,
    indicator_type: &str,
    config: &BridgeConfig,
    env: &Environment,
) -> Result<IntelReport, CliError> {
    let kind = parse_indicator_type(indicator_type)?;
    require_crowdstrike(config, "threat intel lookup")?;
    let facade = connect(config, env)?;
    let client = endpoint_client(&facade)?;

    info!(indicator, %kind, "looking up threat intel");
    let matches = client.threat_intel(indicator, kind).await?;
    Ok(IntelReport {
        indicator: indicator.trim().to_owned(),
        indicator_type: kind,
        matches,
    })
}

fn parse_indicator_type(raw: &str) -> Result<IndicatorType, CliError> {
    IndicatorType::from_str_loose(raw).ok_or_else(|| {
        CliError::Usage(format!(
            "unknown indicator type '{raw}' (expected: ip_address, domain, md5, sha256, url)"
        ))
    })
}

#[derive(Debug, Serialize)]
pub struct IntelReport {
    pub indicator: String,
    pub indicator_type: IndicatorType,
    pub matches: Vec<IntelIndicator>,
}

impl Render for IntelReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.matches.is_empty() {
            return writeln!(
                w,
                "{} ({}): {}",
                self.indicator,
                self.indicator_type,
                "no intel".dimmed()
            );
        }

        writeln!(w, "{} ({})", self.indicator.bold(), self.indicator_type)?;
        for intel in &self.matches {
            let confidence = intel.malicious_confidence.as_deref().unwrap_or("unverified");
            let confidence = match confidence {
                "high" => confidence.red().bold(),
                "medium" => confidence.yellow(),
                _ => confidence.normal(),
            };
            writeln!(
                w,
                "  {:<40} {}",
                intel.id.as_deref().unwrap_or("-"),
                confidence
            )?;
            if !intel.actors.is_empty() {
                writeln!(w, "    actors:   {}", intel.actors.join(", "))?;
            }
            if !intel.malware_families.is_empty() {
                writeln!(w, "    malware:  {}", intel.malware_families.join(", "))?;
            }
        }
        Ok(())
    }
}
