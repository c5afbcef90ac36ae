use clap::Parser;
use colored::Colorize;

use secbridge_cli::cli::Cli;
use secbridge_cli::{commands, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let general = logging::general_config(&cli.config, cli.log_level.as_deref()).await;
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("{} {e:#}", "warning:".yellow().bold());
    }

    tracing::debug!(config = %cli.config.display(), "secbridge starting");

    if let Err(e) = commands::run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(e.exit_code());
    }
}
