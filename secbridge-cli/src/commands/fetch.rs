//! `secbridge fetch` command handler

use std::io::Write;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use secbridge_core::config::BridgeConfig;
use secbridge_core::event::{SecurityEvent, SkippedRecord};
use secbridge_core::filter::{EventFilter, FilterValue};
use secbridge_core::types::{EventCategory, Severity, Vendor};
use secbridge_credentials::Environment;
use secbridge_vendors::{FetchOutcome, VendorFailure};

use super::{connect, parse_categories, restrict_vendors};
use crate::cli::FetchArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `fetch` command.
///
/// Partial failures are reported but do not fail the command. It fails only
/// when no event came back and at least one stream failed.
pub async fn execute(
    args: &FetchArgs,
    config: &BridgeConfig,
    env: &Environment,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = fetch_report(args, config, env).await?;
    writer.render(&report)?;

    if report.events.is_empty() && !report.failures.is_empty() {
        return Err(CliError::VendorUnavailable(format!(
            "all {} failing vendor streams returned no events",
            report.failures.len()
        )));
    }
    Ok(())
}

/// Runs the fetch and collects everything into a report.
pub async fn fetch_report(
    args: &FetchArgs,
    config: &BridgeConfig,
    env: &Environment,
) -> Result<FetchReport, CliError> {
    let mut config = config.clone();
    restrict_vendors(&mut config, &args.vendors)?;
    let categories = parse_categories(&args.categories)?;
    let filter = build_filter(args, Utc::now())?;

    let facade = connect(&config, env)?;
    let stream = facade.fetch(&categories, &filter, args.pages);
    info!(
        vendors = ?facade.vendors(),
        streams = stream.stream_count(),
        pages = args.pages,
        "fetching events"
    );

    let outcome = stream.collect().await;
    for failure in &outcome.failures {
        warn!(
            vendor = %failure.vendor,
            category = %failure.category,
            error = %failure.error,
            "vendor stream failed"
        );
    }
    Ok(FetchReport::from(outcome))
}

/// Translate command-line flags into an [`EventFilter`].
pub fn build_filter(args: &FetchArgs, now: DateTime<Utc>) -> Result<EventFilter, CliError> {
    let mut filter = EventFilter::new();

    if let Some(since) = &args.since {
        filter = filter.since(parse_time("since", since)?);
    } else if let Some(minutes) = args.last {
        if minutes <= 0 {
            return Err(CliError::Usage("--last must be a positive number of minutes".to_owned()));
        }
        let since = TimeDelta::try_minutes(minutes)
            .and_then(|delta| now.checked_sub_signed(delta))
            .ok_or_else(|| CliError::Usage(format!("--last {minutes} is out of range")))?;
        filter = filter.since(since);
    }
    if let Some(until) = &args.until {
        filter = filter.until(parse_time("until", until)?);
    }
    if let Some(raw) = &args.min_severity {
        let severity = Severity::from_str_loose(raw).ok_or_else(|| {
            CliError::Usage(format!(
                "unknown severity '{raw}' (expected: info, low, medium, high, critical or 0-4)"
            ))
        })?;
        filter = filter.min_severity(severity);
    }
    for param in &args.params {
        let (key, value) = param
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CliError::Usage(format!("--param '{param}' is not KEY=VALUE")))?;
        filter = filter.param(key, FilterValue::infer(value));
    }
    Ok(filter)
}

fn parse_time(flag: &str, raw: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CliError::Usage(format!("--{flag} '{raw}' is not RFC 3339: {e}")))
}

#[derive(Debug, Serialize)]
pub struct FetchReport {
    pub pages: usize,
    pub events: Vec<SecurityEvent>,
    pub skipped: Vec<SkippedRecord>,
    pub failures: Vec<FailureReport>,
}

#[derive(Debug, Serialize)]
pub struct FailureReport {
    pub vendor: Vendor,
    pub category: EventCategory,
    pub pages_fetched: usize,
    pub kind: &'static str,
    pub error: String,
}

impl From<VendorFailure> for FailureReport {
    fn from(failure: VendorFailure) -> Self {
        Self {
            vendor: failure.vendor,
            category: failure.category,
            pages_fetched: failure.pages_fetched,
            kind: failure.error.kind(),
            error: failure.error.to_string(),
        }
    }
}

impl From<FetchOutcome> for FetchReport {
    fn from(outcome: FetchOutcome) -> Self {
        Self {
            pages: outcome.pages,
            events: outcome.events,
            skipped: outcome.skipped,
            failures: outcome.failures.into_iter().map(FailureReport::from).collect(),
        }
    }
}

impl Render for FetchReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{:<26} {:<12} {:<14} {:<9} {:<28} Entity",
            "Timestamp", "Vendor", "Category", "Severity", "ID"
        )?;
        writeln!(w, "{}", "-".repeat(110))?;

        for event in &self.events {
            let severity = event.severity.to_string();
            let severity = match event.severity {
                Severity::Critical => severity.red().bold(),
                Severity::High => severity.red(),
                Severity::Medium => severity.yellow(),
                _ => severity.normal(),
            };
            let entity = event
                .entity
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_owned());
            writeln!(
                w,
                "{:<26} {:<12} {:<14} {:<9} {:<28} {}",
                event.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
                event.source,
                event.category,
                severity,
                event.native_id,
                entity
            )?;
            if let Some(title) = &event.title {
                writeln!(w, "  {}", title.dimmed())?;
            }
        }

        writeln!(w)?;
        writeln!(
            w,
            "{} events from {} pages, {} records skipped",
            self.events.len(),
            self.pages,
            self.skipped.len()
        )?;

        for f in &self.failures {
            writeln!(
                w,
                "  {} {}/{} after {} pages: {}",
                "failed".red().bold(),
                f.vendor,
                f.category,
                f.pages_fetched,
                f.error
            )?;
        }
        Ok(())
    }
}
