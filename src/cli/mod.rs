//! Command-line interface for adrunner.
//!
//! Provides commands for running projects, inspecting the registry and the
//! environment, browsing previous runs, and aggregating subject predictions.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, Overrides, ResolvedConfig};
use crate::core::collector::{list_runs as find_runs, MANIFEST_FILE};
use crate::core::orchestrator::{ConfirmFn, EventFn};
use crate::core::{probe, Orchestrator, ProjectSpec, RealAction, Registry};
use crate::domain::{
    parse_selection, CapabilityReport, Decision, OutputStream, ProjectId, RunEvent, RunManifest,
};
use crate::report::{self, ProjectPrediction};

/// Environment variable that disables the confirmation prompt
pub const ENV_CI: &str = "CI";

/// adrunner - conservative runner for external research pipelines
#[derive(Parser, Debug)]
#[command(name = "adrunner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing one subdirectory per project
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Base directory for timestamped run directories
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the selected projects (real where possible, simulated otherwise)
    Run {
        /// Comma-separated project ids, or "all"
        #[arg(short, long, default_value = "all")]
        projects: String,

        /// Python executable for python-based projects
        #[arg(long)]
        python: Option<String>,

        /// Soft timeout per project, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not ask before running real commands
        #[arg(long)]
        no_confirm: bool,

        /// Do not echo project output
        #[arg(short, long)]
        quiet: bool,
    },

    /// List registered projects and their conservative commands
    Projects,

    /// Show capability reports without running anything
    Probe {
        /// Projects to probe (default: all)
        projects: Vec<String>,
    },

    /// List previous runs, most recent first
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a stored run manifest
    Show {
        /// Run directory (absolute, or relative to the output base)
        run_dir: PathBuf,
    },

    /// Aggregate per-project predictions for one subject
    Predict {
        /// Run directory (absolute, or relative to the output base)
        run_dir: PathBuf,

        /// Subject id (e.g. SUBJ001)
        subject: String,

        /// Probability at or above which the subject is labeled AD
        #[arg(long, default_value = "0.5")]
        threshold: f64,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let mut overrides = Overrides {
            workspace: self.workspace,
            output: self.output_dir,
            ..Default::default()
        };

        match self.command {
            Commands::Run {
                projects,
                python,
                timeout,
                no_confirm,
                quiet,
            } => {
                overrides.python = python;
                overrides.timeout_seconds = timeout;
                let cfg = resolved(&overrides)?;
                let interactive = !no_confirm && std::env::var_os(ENV_CI).is_none();
                run_projects(&cfg, &projects, interactive, quiet).await
            }
            Commands::Projects => list_projects(&resolved(&overrides)?),
            Commands::Probe { projects } => probe_projects(&resolved(&overrides)?, &projects),
            Commands::Runs { limit } => list_runs(&resolved(&overrides)?, limit),
            Commands::Show { run_dir } => show_run(&resolved(&overrides)?, &run_dir),
            Commands::Predict {
                run_dir,
                subject,
                threshold,
            } => predict(&resolved(&overrides)?, &run_dir, &subject, threshold),
            Commands::Config => show_config(&resolved(&overrides)?),
        }
    }
}

fn resolved(overrides: &Overrides) -> Result<ResolvedConfig> {
    Ok(config::config()?.clone().with_overrides(overrides))
}

fn registry(cfg: &ResolvedConfig) -> Registry {
    Registry::new(&cfg.workspace, cfg.tools.clone())
}

/// Run the selected projects
async fn run_projects(
    cfg: &ResolvedConfig,
    projects: &str,
    interactive: bool,
    quiet: bool,
) -> Result<()> {
    let selected: Vec<String> = parse_selection(projects)?
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect();

    let orchestrator = Orchestrator::new(registry(cfg), cfg.limits.clone(), &cfg.output);

    let mut prompt = |spec: &ProjectSpec, action: &RealAction| confirm_real(spec, action);
    let mut print = |event: &RunEvent| print_event(event, quiet);

    let confirm: Option<ConfirmFn<'_>> = if interactive {
        Some(&mut prompt)
    } else {
        None
    };
    let on_event: Option<EventFn<'_>> = Some(&mut print);

    let manifest = orchestrator.run(&selected, confirm, on_event).await?;

    println!();
    print_manifest(&manifest);
    println!();
    println!("Results saved to: {}", manifest.run_dir.display());

    Ok(())
}

/// Ask on the terminal before a real command runs. EOF declines.
fn confirm_real(spec: &ProjectSpec, action: &RealAction) -> bool {
    println!("About to run conservative command(s) for {}:", spec.id);
    for invocation in action.invocations() {
        println!("  {}", invocation.display());
    }
    print!("Proceed? [Y/n] ");
    let _ = io::stdout().flush();

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes"),
    }
}

fn print_event(event: &RunEvent, quiet: bool) {
    match event {
        RunEvent::RunStarted { run_dir, .. } => {
            println!("Run directory: {}", run_dir.display());
        }
        RunEvent::ProjectStarted {
            project,
            index,
            total,
            ..
        } => {
            println!();
            println!("==> [{}/{}] {}", index, total, project);
        }
        RunEvent::Decision {
            decision, reasons, ..
        } => {
            let label = match decision {
                Decision::RunReal => "running conservative command",
                Decision::RunSimulated => "simulating",
                Decision::Skip => "skipping",
            };
            println!("    {}", label);
            if *decision != Decision::RunReal {
                for reason in reasons {
                    println!("      - {}", reason);
                }
            }
        }
        RunEvent::Output { project, line } => {
            if !quiet {
                match line.stream {
                    OutputStream::Stdout => println!("[{}] {}", project, line.text),
                    OutputStream::Stderr => println!("[{}][stderr] {}", project, line.text),
                }
            }
        }
        RunEvent::ProjectFinished {
            outcome, exit_code, ..
        } => match exit_code {
            Some(code) => println!("    {} (exit {})", outcome.as_str(), code),
            None => println!("    {}", outcome.as_str()),
        },
        RunEvent::RunFinished { manifest_path, .. } => {
            println!();
            println!("Manifest: {}", manifest_path.display());
        }
    }
}

fn print_manifest(manifest: &RunManifest) {
    println!("Invocation: {}", manifest.invocation_id);
    println!("Started:    {}", manifest.started_at);
    if let Some(finished) = manifest.finished_at {
        println!("Finished:   {}", finished);
    }
    println!();
    println!("{:<24} {:<10} {:<6} {:<6}", "PROJECT", "OUTCOME", "EXIT", "FILES");
    println!("{}", "-".repeat(50));
    for record in &manifest.records {
        let exit = record
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<10} {:<6} {:<6}",
            record.project.as_str(),
            record.outcome.as_str(),
            exit,
            record.files.len()
        );
    }
    if !manifest.summary.is_empty() {
        println!();
        println!("{}", manifest.summary);
    }
}

/// List registered projects
fn list_projects(cfg: &ResolvedConfig) -> Result<()> {
    let registry = registry(cfg);
    let placeholder = Path::new("<output-dir>");

    for spec in registry.specs() {
        println!("{}", spec.id);
        println!("  {}", spec.description);
        let invocations =
            registry.invocations(spec.id, placeholder, &CapabilityReport::satisfied(spec.id));
        if invocations.is_empty() {
            println!("  command: (none allow-listed, always simulated)");
        }
        for invocation in invocations {
            println!("  command: {}", invocation.display());
        }
        if !spec.collect.is_empty() {
            println!("  collects: {}", spec.collect.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Print capability reports
fn probe_projects(cfg: &ResolvedConfig, projects: &[String]) -> Result<()> {
    let registry = registry(cfg);
    let ids: Vec<ProjectId> = if projects.is_empty() {
        registry.ids()
    } else {
        projects
            .iter()
            .map(|p| registry.lookup(p).map(|spec| spec.id))
            .collect::<Result<_, _>>()?
    };

    println!(
        "{:<24} {:<8} {:<8} {:<8} {:<14}",
        "PROJECT", "SOURCE", "TOOL", "DATA", "DECISION"
    );
    println!("{}", "-".repeat(66));
    for id in ids {
        let report = probe::probe(&registry, id);
        let decision = crate::core::decide(registry.spec(id), &report, true);
        println!(
            "{:<24} {:<8} {:<8} {:<8} {:<14}",
            id.as_str(),
            yes_no(report.source_present),
            yes_no(report.tool_present),
            yes_no(report.data_present),
            decision.decision.as_str()
        );
        for note in &report.notes {
            println!("    {}", note);
        }
        for (tool, path) in &report.resolved_tools {
            println!("    {} -> {}", tool, path.display());
        }
    }

    Ok(())
}

fn yes_no(present: bool) -> &'static str {
    if present {
        "yes"
    } else {
        "no"
    }
}

/// List previous runs
fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let runs = find_runs(&cfg.output)?;

    if runs.is_empty() {
        println!("No runs found in {}", cfg.output.display());
        return Ok(());
    }

    println!(
        "{:<22} {:<9} {:<9} {:<7} {:<7}",
        "RUN", "EXECUTED", "SIMULATED", "FAILED", "SKIPPED"
    );
    println!("{}", "-".repeat(58));

    for run_dir in runs.into_iter().take(limit) {
        let name = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match RunManifest::load(&run_dir.join(MANIFEST_FILE)) {
            Ok(m) => {
                use crate::domain::Outcome;
                println!(
                    "{:<22} {:<9} {:<9} {:<7} {:<7}",
                    name,
                    m.count(Outcome::Executed),
                    m.count(Outcome::Simulated),
                    m.count(Outcome::Failed),
                    m.count(Outcome::Skipped)
                );
            }
            Err(e) => println!("{:<22} (unreadable manifest: {:#})", name, e),
        }
    }

    Ok(())
}

/// Accept a run directory as given, or by name under the output base
fn locate_run(cfg: &ResolvedConfig, run_dir: &Path) -> Result<PathBuf> {
    if run_dir.is_dir() {
        return Ok(run_dir.to_path_buf());
    }
    let under_base = cfg.output.join(run_dir);
    if under_base.is_dir() {
        return Ok(under_base);
    }
    anyhow::bail!("Run directory not found: {}", run_dir.display())
}

/// Show a stored manifest
fn show_run(cfg: &ResolvedConfig, run_dir: &Path) -> Result<()> {
    let dir = locate_run(cfg, run_dir)?;
    let manifest = RunManifest::load(&dir.join(MANIFEST_FILE))?;

    println!("Run: {}", manifest.run_dir.display());
    print_manifest(&manifest);

    for record in &manifest.records {
        println!();
        println!("{} [{}]", record.project, record.outcome.as_str());
        for note in &record.notes {
            println!("  note: {}", note);
        }
        for file in &record.files {
            println!("  file: {} ({} bytes)", file.path.display(), file.size_bytes);
        }
        println!("  log:  {}", record.log_path.display());
    }

    Ok(())
}

/// Aggregate predictions for a subject
fn predict(cfg: &ResolvedConfig, run_dir: &Path, subject: &str, threshold: f64) -> Result<()> {
    let dir = locate_run(cfg, run_dir)?;
    let prediction = report::predict_subject(&dir, subject, threshold)
        .with_context(|| format!("Failed to predict subject {}", subject))?;

    println!("Subject: {}", prediction.subject_id);
    for (project, p) in &prediction.per_project {
        match p {
            ProjectPrediction::Ok {
                probability,
                label,
                weight,
                simulated,
            } => println!(
                "  {:<24} {} p={:.3} w={:.2}{}",
                project.as_str(),
                label,
                probability,
                weight,
                if *simulated { " (simulated)" } else { "" }
            ),
            ProjectPrediction::Missing { reason } => {
                println!("  {:<24} missing ({})", project.as_str(), reason)
            }
        }
    }
    println!();
    println!("{}", prediction.final_text);
    if prediction.includes_simulated {
        println!("Includes SIMULATED predictions.");
    }
    println!("{}", prediction.disclaimer);
    println!("Report: {}", prediction.report_path.display());

    Ok(())
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("adrunner configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Workspace: {}", cfg.workspace.display());
    println!("  Output:    {}", cfg.output.display());
    println!();
    println!("Tools:");
    println!("  python:    {}", cfg.tools.python);
    println!("  rscript:   {}", cfg.tools.rscript);
    println!("  nbconvert: {}", cfg.tools.nbconvert);
    println!();
    println!("Limits:");
    println!("  Timeout:       {}s", cfg.limits.effective_timeout_seconds());
    println!("  Capture limit: {} bytes per stream", cfg.limits.max_capture_bytes);

    Ok(())
}
