//! Shared output formatting for CLI commands
//!
//! Reports print as text, JSON or YAML; captured state prints as any
//! document format the loader reads.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::capture::CapturedState;
use crate::reconcile::ApplyReport;
use crate::utils::DocumentFormat;

/// Output format for apply and plan reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Output format for exported state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

impl From<ExportFormat> for DocumentFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Yaml => DocumentFormat::Yaml,
            ExportFormat::Json => DocumentFormat::Json,
            ExportFormat::Toml => DocumentFormat::Toml,
        }
    }
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Print data as YAML
pub fn print_yaml<T: Serialize>(data: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
    println!("{}", yaml);
    Ok(())
}

pub fn print_report(report: &ApplyReport, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => {
            print!("{}", render_report(report));
            Ok(())
        }
        ReportFormat::Json => print_json(report),
        ReportFormat::Yaml => print_yaml(report),
    }
}

pub fn print_state(state: &CapturedState, format: ExportFormat) -> Result<()> {
    let text = DocumentFormat::from(format).render(state)?;
    println!("{}", text.trim_end());
    Ok(())
}

/// Plain-text report: one line per change, field diffs indented beneath
pub fn render_report(report: &ApplyReport) -> String {
    let mut out = String::new();
    if report.is_noop() && !report.has_failures() {
        out.push_str("No changes. Live state matches the desired state.\n");
        return out;
    }

    for change in &report.changes {
        out.push_str(&format!("{}\n", change));
        for field in &change.diff {
            out.push_str(&format!("    {}\n", field));
        }
    }
    for failure in &report.failures {
        out.push_str(&format!(
            "! failed {} [{}]: {}\n",
            failure.load_balancer, failure.network, failure.error
        ));
    }

    let prefix = if report.dry_run { "Plan: " } else { "Applied: " };
    out.push_str(&format!("\n{}{}\n", prefix, report.summary()));
    out
}
