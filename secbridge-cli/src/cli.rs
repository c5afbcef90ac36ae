//! CLI argument parsing using clap derive API
//!
//! Purely declarative. Values such as vendors, categories and timestamps
//! stay strings here and are interpreted by the command handlers.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// secbridge -- one interface over CrowdStrike, Microsoft and Proofpoint security APIs.
///
/// Use `secbridge <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "secbridge", version, about, long_about = None)]
pub struct Cli {
    /// Path to the secbridge.toml configuration file.
    #[arg(short, long, default_value = "secbridge.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch normalized security events from the enabled vendors.
    Fetch(FetchArgs),

    /// Probe connectivity and credentials for each vendor category.
    Health(HealthArgs),

    /// Look up an endpoint by hostname.
    Host(HostArgs),

    /// Look up threat intelligence for an indicator.
    Intel(IntelArgs),

    /// List open vulnerabilities, optionally for one host.
    Vulns(VulnsArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- fetch ----

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Only query these vendors (crowdstrike, microsoft, proofpoint). Repeatable.
    #[arg(long = "vendor")]
    pub vendors: Vec<String>,

    /// Only fetch these categories (detection, incident, alert, identity-risk, email-threat).
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Start of the time range (RFC 3339).
    #[arg(long, conflicts_with = "last")]
    pub since: Option<String>,

    /// End of the time range (RFC 3339, default: now).
    #[arg(long)]
    pub until: Option<String>,

    /// Relative start of the time range in minutes, e.g. `--last 90`.
    #[arg(long)]
    pub last: Option<i64>,

    /// Minimum severity (info, low, medium, high, critical or 0-4).
    #[arg(long)]
    pub min_severity: Option<String>,

    /// Vendor-specific filter as key=value, e.g. `--param status=new`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Maximum pages to read per vendor category.
    #[arg(long, default_value_t = 5)]
    pub pages: usize,
}

// ---- health ----

#[derive(Args, Debug, Default)]
pub struct HealthArgs {
    /// Only probe these categories. Repeatable.
    #[arg(long = "category")]
    pub categories: Vec<String>,
}

// ---- host ----

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Exact hostname as reported by the endpoint agent.
    pub hostname: String,
}

// ---- intel ----

#[derive(Args, Debug)]
pub struct IntelArgs {
    /// Indicator value: IP address, domain, hash or URL.
    pub indicator: String,

    /// Indicator type (ip_address, domain, md5, sha256, url).
    #[arg(long = "type", value_name = "TYPE")]
    pub indicator_type: String,
}

// ---- vulns ----

#[derive(Args, Debug, Default)]
pub struct VulnsArgs {
    /// Only vulnerabilities on this host.
    #[arg(long)]
    pub hostname: Option<String>,
}

// ---- config ----

/// Manage secbridge configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, cloud, http, crowdstrike, microsoft, proofpoint).
        #[arg(long)]
        section: Option<String>,
    },
}
