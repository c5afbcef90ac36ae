//! `secbridge vulns` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use secbridge_core::config::BridgeConfig;
use secbridge_credentials::Environment;
use secbridge_vendors::Vulnerability;

use super::{connect, endpoint_client, require_crowdstrike};
use crate::cli::VulnsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `vulns` command.
pub async fn execute(
    args: &VulnsArgs,
    config: &BridgeConfig,
    env: &Environment,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = list(args.hostname.as_deref(), config, env).await?;
    writer.render(&report)?;
    Ok(())
}

pub async fn list(
    hostname: Option<&str>,
    config: &BridgeConfig,
    env: &Environment,
) -> Result<VulnReport, CliError> {
    require_crowdstrike(config, "vulnerability lookup")?;
    let facade = connect(config, env)?;
    let client = endpoint_client(&facade)?;

    info!(hostname = hostname.unwrap_or("*"), "listing open vulnerabilities");
    let vulnerabilities = client.vulnerabilities(hostname).await?;
    Ok(VulnReport {
        hostname: hostname.map(str::to_owned),
        vulnerabilities,
    })
}

#[derive(Debug, Serialize)]
pub struct VulnReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

impl Render for VulnReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<18} {:<10} {:<6} {:<20} Status",
            "CVE", "Severity", "Score", "Host"
        )?;
        writeln!(w, "{}", "-".repeat(70))?;

        for vuln in &self.vulnerabilities {
            let cve = vuln.cve.as_ref();
            let severity = cve
                .and_then(|c| c.severity.as_deref())
                .unwrap_or("-")
                .to_lowercase();
            let severity = match severity.as_str() {
                "critical" => severity.red().bold(),
                "high" => severity.red(),
                "medium" => severity.yellow(),
                _ => severity.normal(),
            };
            let score = cve
                .and_then(|c| c.base_score)
                .map_or_else(|| "-".to_owned(), |s| format!("{s:.1}"));
            writeln!(
                w,
                "{:<18} {:<10} {:<6} {:<20} {}",
                cve.and_then(|c| c.id.as_deref()).unwrap_or("-"),
                severity,
                score,
                vuln.host_info
                    .as_ref()
                    .and_then(|h| h.hostname.as_deref())
                    .unwrap_or("-"),
                vuln.status.as_deref().unwrap_or("-")
            )?;
        }

        writeln!(w)?;
        match &self.hostname {
            Some(host) => writeln!(w, "{} open vulnerabilities on {host}", self.vulnerabilities.len()),
            None => writeln!(w, "{} open vulnerabilities", self.vulnerabilities.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secbridge_vendors::{CveDetails, VulnerableHost};

    #[test]
    fn text_shows_cve_score_and_host() {
        let report = VulnReport {
            hostname: Some("web-01".to_owned()),
            vulnerabilities: vec![
                Vulnerability {
                    status: Some("open".to_owned()),
                    cve: Some(CveDetails {
                        id: Some("CVE-2024-3094".to_owned()),
                        base_score: Some(10.0),
                        severity: Some("CRITICAL".to_owned()),
                        ..CveDetails::default()
                    }),
                    host_info: Some(VulnerableHost {
                        hostname: Some("web-01".to_owned()),
                        ..VulnerableHost::default()
                    }),
                    ..Vulnerability::default()
                },
                Vulnerability::default(),
            ],
        };
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("CVE-2024-3094      critical   10.0   web-01"));
        assert!(text.contains("2 open vulnerabilities on web-01"));
    }

    #[tokio::test]
    async fn requires_crowdstrike_enabled() {
        let mut config = BridgeConfig::default();
        config.crowdstrike.enabled = false;
        let err = list(None, &config, &Environment::default()).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
