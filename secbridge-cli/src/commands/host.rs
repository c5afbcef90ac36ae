//! `secbridge host` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use secbridge_core::config::BridgeConfig;
use secbridge_credentials::Environment;
use secbridge_vendors::HostDetails;

use super::{connect, endpoint_client, require_crowdstrike};
use crate::cli::HostArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `host` command. An unknown hostname exits with code 1.
pub async fn execute(
    args: &HostArgs,
    config: &BridgeConfig,
    env: &Environment,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = lookup(&args.hostname, config, env).await?;
    writer.render(&report)?;

    if report.details.is_none() {
        return Err(CliError::Command(format!("host '{}' not found", report.hostname)));
    }
    Ok(())
}

pub async fn lookup(
    hostname: &str,
    config: &BridgeConfig,
    env: &Environment,
) -> Result<HostReport, CliError> {
    require_crowdstrike(config, "host lookup")?;
    let facade = connect(config, env)?;
    let client = endpoint_client(&facade)?;

    info!(%hostname, "looking up host");
    let details = client.lookup_host(hostname).await?;
    Ok(HostReport {
        hostname: hostname.to_owned(),
        details,
    })
}

#[derive(Debug, Serialize)]
pub struct HostReport {
    pub hostname: String,
    pub details: Option<HostDetails>,
}

impl Render for HostReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let Some(details) = &self.details else {
            return writeln!(w, "Host {}: {}", self.hostname, "not found".yellow());
        };

        writeln!(w, "Host {}", self.hostname.bold())?;
        let rows = [
            ("Device ID", &details.device_id),
            ("Platform", &details.platform_name),
            ("OS version", &details.os_version),
            ("Local IP", &details.local_ip),
            ("External IP", &details.external_ip),
            ("MAC", &details.mac_address),
            ("Agent", &details.agent_version),
            ("Status", &details.status),
            ("First seen", &details.first_seen),
            ("Last seen", &details.last_seen),
        ];
        for (label, value) in rows {
            writeln!(w, "  {:<12} {}", label, value.as_deref().unwrap_or("-"))?;
        }
        Ok(())
    }
}
