//! Subcommand handlers

pub mod config;
pub mod fetch;
pub mod health;
pub mod host;
pub mod intel;
pub mod vulns;

use std::sync::Arc;

use secbridge_core::config::BridgeConfig;
use secbridge_core::types::{EventCategory, Vendor};
use secbridge_credentials::{CredentialBroker, Environment};
use secbridge_vendors::{AnyVendorClient, EndpointDetectionClient, SecurityFacade};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

const USER_AGENT: &str = concat!("secbridge/", env!("CARGO_PKG_VERSION"));

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let env = Environment::capture();

    match cli.command {
        Commands::Config(args) => config::execute(args, &cli.config, &writer).await,
        Commands::Fetch(args) => {
            let config = BridgeConfig::load(&cli.config).await?;
            fetch::execute(&args, &config, &env, &writer).await
        }
        Commands::Health(args) => {
            let config = BridgeConfig::load(&cli.config).await?;
            health::execute(&args, &config, &env, &writer).await
        }
        Commands::Host(args) => {
            let config = BridgeConfig::load(&cli.config).await?;
            host::execute(&args, &config, &env, &writer).await
        }
        Commands::Intel(args) => {
            let config = BridgeConfig::load(&cli.config).await?;
            intel::execute(&args, &config, &env, &writer).await
        }
        Commands::Vulns(args) => {
            let config = BridgeConfig::load(&cli.config).await?;
            vulns::execute(&args, &config, &env, &writer).await
        }
    }
}

/// Build the facade for `config`, reading credentials through `env`.
pub fn connect(config: &BridgeConfig, env: &Environment) -> Result<SecurityFacade, CliError> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CliError::Command(format!("failed to build http client: {e}")))?;
    let broker = CredentialBroker::from_environment(config, env, http.clone())?;
    Ok(SecurityFacade::from_config(config, Arc::new(broker), http)?)
}

/// Fail with a usage error unless CrowdStrike is enabled; `what` names the
/// command for the message.
pub fn require_crowdstrike(config: &BridgeConfig, what: &str) -> Result<(), CliError> {
    if config.vendor_enabled(Vendor::CrowdStrike) {
        return Ok(());
    }
    Err(CliError::Usage(format!(
        "{what} needs the crowdstrike section enabled"
    )))
}

/// The CrowdStrike client of `facade`.
pub fn endpoint_client(facade: &SecurityFacade) -> Result<&EndpointDetectionClient, CliError> {
    facade
        .client(Vendor::CrowdStrike)
        .and_then(AnyVendorClient::as_crowdstrike)
        .ok_or_else(|| CliError::Command("crowdstrike client is not configured".to_owned()))
}

/// Keep only the named vendors enabled. An empty list keeps the config as is.
pub fn restrict_vendors(config: &mut BridgeConfig, names: &[String]) -> Result<(), CliError> {
    if names.is_empty() {
        return Ok(());
    }
    let selected = names
        .iter()
        .map(|name| {
            Vendor::from_str_loose(name).ok_or_else(|| {
                CliError::Usage(format!(
                    "unknown vendor '{name}' (expected: crowdstrike, microsoft, proofpoint)"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for vendor in &selected {
        if !config.vendor_enabled(*vendor) {
            return Err(CliError::Usage(format!(
                "vendor '{vendor}' is disabled in the configuration"
            )));
        }
    }
    for vendor in Vendor::ALL {
        if !selected.contains(&vendor) {
            set_enabled(config, vendor, false);
        }
    }
    Ok(())
}

fn set_enabled(config: &mut BridgeConfig, vendor: Vendor, enabled: bool) {
    match vendor {
        Vendor::CrowdStrike => config.crowdstrike.enabled = enabled,
        Vendor::Microsoft => config.microsoft.enabled = enabled,
        Vendor::Proofpoint => config.proofpoint.enabled = enabled,
    }
}

pub fn parse_categories(names: &[String]) -> Result<Vec<EventCategory>, CliError> {
    names
        .iter()
        .map(|name| {
            EventCategory::from_str_loose(name).ok_or_else(|| {
                CliError::Usage(format!(
                    "unknown category '{name}' \
                     (expected: detection, incident, alert, identity-risk, email-threat)"
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn restrict_disables_unselected_vendors() {
        let mut config = BridgeConfig::default();
        restrict_vendors(&mut config, &names(&["Falcon"])).unwrap();
        assert!(config.crowdstrike.enabled);
        assert!(!config.microsoft.enabled);
        assert!(!config.proofpoint.enabled);
    }

    #[test]
    fn restrict_with_empty_list_is_noop() {
        let mut config = BridgeConfig::default();
        restrict_vendors(&mut config, &[]).unwrap();
        assert!(Vendor::ALL.iter().all(|v| config.vendor_enabled(*v)));
    }

    #[test]
    fn restrict_rejects_unknown_and_disabled_vendors() {
        let mut config = BridgeConfig::default();
        let err = restrict_vendors(&mut config, &names(&["sentinelone"])).unwrap_err();
        assert!(err.to_string().contains("unknown vendor 'sentinelone'"));

        config.proofpoint.enabled = false;
        let err = restrict_vendors(&mut config, &names(&["proofpoint"])).unwrap_err();
        assert!(err.to_string().contains("disabled"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn categories_parse_loosely() {
        let parsed = parse_categories(&names(&["detection", "email-threat"])).unwrap();
        assert_eq!(parsed, [EventCategory::Detection, EventCategory::EmailThreat]);
        assert!(parse_categories(&names(&["syslog"])).is_err());
    }
}
