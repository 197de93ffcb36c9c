//! # Command Line Interface
//!
//! `apply` converges the live topology toward one or more desired-state
//! documents, `plan` does the same as a dry run, and `export` captures the
//! live topology as documents the loader reads back.
//!
//! The live topology is the file-backed [`MemoryGateway`] named by `--state`;
//! it is saved again after every non-dry apply.

pub mod output;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::capture::{capture, CapturedState, ExportLayout};
use crate::config::Settings;
use crate::desired::load_desired_state;
use crate::gateway::MemoryGateway;
use crate::observability::{init_logging, log_settings_info};
use crate::reconcile::{ApplyOptions, ApplyReport, ScopeFilter, TopologyReconciler};
use crate::utils::{write_document, DocumentFormat};

use output::{ExportFormat, ReportFormat};

const DEFAULT_STATE_FILE: &str = "albsync-state.yaml";

#[derive(Parser)]
#[command(name = "albsync")]
#[command(about = "Reconcile application load balancers against declared state")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./albsync.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Live topology snapshot
    #[arg(long, global = true, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,

    /// Only touch load balancers whose name is listed
    #[arg(long, global = true, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Skip load balancers by name, or by `/regex/`
    #[arg(long, global = true, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge live state toward the desired-state files
    Apply {
        #[command(flatten)]
        run: RunArgs,

        /// Show what would change without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what `apply` would change
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Capture the live state as desired-state documents
    Export {
        /// Output file, or directory with --split/--split-more; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Yaml)]
        format: ExportFormat,

        /// One document per network
        #[arg(long)]
        split: bool,

        /// One document per load balancer
        #[arg(long, conflicts_with = "split")]
        split_more: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Desired-state documents (.yaml, .yml, .json, .toml)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Record failures per load balancer and continue with the next one
    #[arg(long)]
    pub isolate_failures: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = resolve_settings(&cli)?;
    init_logging(&settings.logging)?;
    log_settings_info(&settings);

    let gateway = MemoryGateway::load(&cli.state)
        .with_context(|| format!("Failed to load state from {}", cli.state.display()))?;

    match cli.command {
        Commands::Apply { run, dry_run } => {
            let report = handle_apply(&gateway, &settings, &run, dry_run, &cli.state).await?;
            finish(&report)?
        }
        Commands::Plan { run } => {
            let report = handle_apply(&gateway, &settings, &run, true, &cli.state).await?;
            finish(&report)?
        }
        Commands::Export { output, format, split, split_more } => {
            let layout = match (split, split_more) {
                (_, true) => ExportLayout::PerLoadBalancer,
                (true, false) => ExportLayout::PerNetwork,
                _ => ExportLayout::Single,
            };
            let scope = ScopeFilter::from_settings(&settings.scope)?;
            let state = capture(&gateway, &scope).await?;
            handle_export(&state, output.as_deref(), format, layout)?
        }
    }

    Ok(())
}

/// Settings file, then environment, then command-line flags
fn resolve_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if !cli.include.is_empty() {
        settings.scope.include = cli.include.clone();
    }
    if !cli.exclude.is_empty() {
        settings.scope.exclude = cli.exclude.clone();
    }
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    settings.validate()?;
    Ok(settings)
}

/// Apply, then persist the live state unless dry-running.
///
/// Calls that succeeded before a failure are kept: the state is saved before
/// the error is returned.
async fn handle_apply(
    gateway: &MemoryGateway,
    settings: &Settings,
    run: &RunArgs,
    force_dry_run: bool,
    state_path: &Path,
) -> anyhow::Result<ApplyReport> {
    let dry_run = settings.dry_run || force_dry_run;
    let options = ApplyOptions::from_settings(settings)?
        .dry_run(dry_run)
        .isolate_failures(settings.isolate_failures || run.isolate_failures);

    let desired = load_desired_state(&run.files)?;
    let result = TopologyReconciler::new(gateway, options).apply(&desired).await;
    if !dry_run {
        gateway
            .save(state_path)
            .with_context(|| format!("Failed to save state to {}", state_path.display()))?;
    }
    let report = result?;
    output::print_report(&report, run.format)?;
    Ok(report)
}

fn finish(report: &ApplyReport) -> anyhow::Result<()> {
    if report.has_failures() {
        anyhow::bail!("{} load balancer(s) failed to reconcile", report.failures.len());
    }
    Ok(())
}

fn handle_export(
    state: &CapturedState,
    output: Option<&Path>,
    format: ExportFormat,
    layout: ExportLayout,
) -> anyhow::Result<()> {
    let Some(output) = output else {
        if layout != ExportLayout::Single {
            anyhow::bail!("--split and --split-more need --output <DIR>");
        }
        return output::print_state(state, format);
    };

    let extension = DocumentFormat::from(format).extension();
    let documents = state.documents(layout, "albsync");
    for (relative, document) in &documents {
        let path = match layout {
            ExportLayout::Single if output.extension().is_some() => output.to_path_buf(),
            _ => output.join(relative).with_extension(extension),
        };
        write_document(&path, document)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    info!(documents = documents.len(), output = %output.display(), "Exported live state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "albsync",
            "apply",
            "web.yaml",
            "api.yaml",
            "--dry-run",
            "--exclude",
            "legacy,/^tmp-/",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.exclude, vec!["legacy", "/^tmp-/"]);
        match cli.command {
            Commands::Apply { run, dry_run } => {
                assert!(dry_run);
                assert_eq!(run.files.len(), 2);
                assert_eq!(run.format, ReportFormat::Json);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_apply_requires_files() {
        assert!(Cli::try_parse_from(["albsync", "plan"]).is_err());
    }

    #[test]
    fn test_split_flags_conflict() {
        assert!(Cli::try_parse_from(["albsync", "export", "--split", "--split-more"]).is_err());
    }

    fn run_args(files: Vec<PathBuf>) -> RunArgs {
        RunArgs { files, isolate_failures: false, format: ReportFormat::Json }
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_completed_calls() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.yaml");
        let desired_path = dir.path().join("desired.yaml");
        std::fs::write(
            &desired_path,
            "networks:\n  vpc-1:\n    load_balancers:\n      - name: a\n        \
             subnets: [subnet-1]\n        security_groups: [sg-1]\n        listeners:\n          \
             - port: 80\n            default_actions:\n              \
             - target_group_name: missing\n",
        )
        .unwrap();

        let gateway = MemoryGateway::new().with_subnet("subnet-1", "vpc-1");
        let settings = Settings::default();
        let result =
            handle_apply(&gateway, &settings, &run_args(vec![desired_path]), false, &state_path)
                .await;
        assert!(result.is_err());

        let saved = MemoryGateway::load(&state_path).unwrap().snapshot();
        assert_eq!(saved.load_balancers.len(), 1);
        assert_eq!(saved.load_balancers[0].load_balancer.name, "a");
    }

    #[tokio::test]
    async fn test_plan_does_not_write_state() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.yaml");
        let desired_path = dir.path().join("desired.yaml");
        std::fs::write(
            &desired_path,
            "networks:\n  vpc-1:\n    load_balancers:\n      - name: a\n        \
             subnets: [subnet-1]\n        security_groups: [sg-1]\n",
        )
        .unwrap();

        let gateway = MemoryGateway::new().with_subnet("subnet-1", "vpc-1");
        let report = handle_apply(
            &gateway,
            &Settings::default(),
            &run_args(vec![desired_path]),
            true,
            &state_path,
        )
        .await
        .unwrap();
        assert!(report.dry_run);
        assert!(!state_path.exists());
    }

    #[test]
    fn test_export_split_layout_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CapturedState::default();
        state.networks.insert("vpc-1".to_string(), Default::default());
        state.networks.insert("vpc-2".to_string(), Default::default());

        handle_export(&state, Some(dir.path()), ExportFormat::Json, ExportLayout::PerNetwork)
            .unwrap();
        assert!(dir.path().join("vpc-1.json").exists());
        assert!(dir.path().join("vpc-2.json").exists());
    }

    #[test]
    fn test_export_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.yaml");
        let state = CapturedState::default();
        handle_export(&state, Some(&path), ExportFormat::Yaml, ExportLayout::Single).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_split_without_output_is_rejected() {
        let state = CapturedState::default();
        let result = handle_export(&state, None, ExportFormat::Yaml, ExportLayout::PerNetwork);
        assert!(result.is_err());
    }
}
