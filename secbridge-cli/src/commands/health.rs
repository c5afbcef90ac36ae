//! `secbridge health` command handler

use std::io::Write;

use tracing::info;

use secbridge_core::config::BridgeConfig;
use secbridge_core::health::HealthStatus;
use secbridge_credentials::Environment;
use secbridge_vendors::ProbeSummary;

use super::{connect, parse_categories};
use crate::cli::HealthArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `health` command.
///
/// Degraded vendors are shown but succeed; any unhealthy category fails
/// the command with exit code 3.
pub async fn execute(
    args: &HealthArgs,
    config: &BridgeConfig,
    env: &Environment,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let summary = probe(args, config, env).await?;
    writer.render(&summary)?;

    if let HealthStatus::Unhealthy(reason) = &summary.status {
        return Err(CliError::VendorUnavailable(reason.clone()));
    }
    Ok(())
}

pub async fn probe(
    args: &HealthArgs,
    config: &BridgeConfig,
    env: &Environment,
) -> Result<ProbeSummary, CliError> {
    let categories = parse_categories(&args.categories)?;
    let facade = connect(config, env)?;
    info!(vendors = ?facade.vendors(), "probing vendors");
    Ok(facade.probe(&categories).await)
}

fn status_label(status: &HealthStatus) -> colored::ColoredString {
    use colored::Colorize;

    match status {
        HealthStatus::Healthy => "healthy".green(),
        HealthStatus::Degraded(_) => "degraded".yellow(),
        HealthStatus::Unhealthy(_) => "unhealthy".red().bold(),
    }
}

impl Render for ProbeSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Overall: {}", status_label(&self.status))?;
        writeln!(w)?;
        writeln!(w, "{:<30} Status", "Component")?;
        writeln!(w, "{}", "-".repeat(60))?;

        for report in &self.vendors {
            for component in &report.categories {
                writeln!(w, "{:<30} {}", component.name, status_label(&component.status))?;
                match &component.status {
                    HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                        writeln!(w, "  {}", reason.dimmed())?;
                    }
                    HealthStatus::Healthy => {}
                }
            }
        }
        Ok(())
    }
}
