//! Per-project run records and the per-invocation manifest.
//!
//! A `RunRecord` is owned by the orchestrator while its project is being
//! processed and becomes read-only once pushed onto the `RunManifest`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::artifact::ProducedFile;
use super::capability::CapabilityReport;
use super::project::ProjectId;

/// What the run policy chose for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Run the allow-listed command
    RunReal,

    /// Produce a labeled synthetic artifact
    RunSimulated,

    /// Do nothing (explicit user exclusion only)
    Skip,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::RunReal => "run_real",
            Decision::RunSimulated => "run_simulated",
            Decision::Skip => "skip",
        }
    }
}

/// Final outcome tag of a project within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Executed,
    Skipped,
    Simulated,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Executed => "executed",
            Outcome::Skipped => "skipped",
            Outcome::Simulated => "simulated",
            Outcome::Failed => "failed",
        }
    }
}

/// Why a project ended up `failed`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    #[error("Execution timed out after {timeout_seconds}s")]
    ExecutionTimeout { timeout_seconds: u64 },

    #[error("Command '{command}' exited with {status}")]
    NonZeroExit { command: String, status: String },

    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Simulation failed: {message}")]
    SimulationError { message: String },
}

/// Everything recorded about one project in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub project: ProjectId,

    pub outcome: Outcome,

    /// Capability findings that drove the decision
    pub capabilities: CapabilityReport,

    /// Why real execution did or did not happen, and what went wrong
    #[serde(default)]
    pub notes: Vec<String>,

    /// Captured stdout (possibly truncated)
    #[serde(default)]
    pub stdout: String,

    /// Captured stderr (possibly truncated)
    #[serde(default)]
    pub stderr: String,

    /// Whether captured text was cut at the capture ceiling
    #[serde(default)]
    pub truncated: bool,

    /// Files written under the project's subdirectory
    #[serde(default)]
    pub files: Vec<ProducedFile>,

    /// Path to the project's run.log
    pub log_path: PathBuf,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Exit code of the last invocation (real runs only)
    pub exit_code: Option<i32>,

    pub failure: Option<FailureKind>,
}

impl RunRecord {
    /// Open a record at the start of a project's processing
    pub fn start(project: ProjectId, capabilities: CapabilityReport, log_path: PathBuf) -> Self {
        Self {
            project,
            outcome: Outcome::Skipped,
            capabilities,
            notes: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            files: Vec::new(),
            log_path,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
            failure: None,
        }
    }

    /// Set the final outcome. A failure always forces `Failed`.
    pub fn finish(&mut self, outcome: Outcome, exit_code: Option<i32>, failure: Option<FailureKind>) {
        self.outcome = if failure.is_some() {
            Outcome::Failed
        } else {
            outcome
        };
        self.exit_code = exit_code;
        if let Some(ref f) = failure {
            self.notes.push(f.to_string());
        }
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Terminal artifact of one orchestration call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub invocation_id: Uuid,

    /// The timestamped run directory
    pub run_dir: PathBuf,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// One record per selected project, in selection order
    pub records: Vec<RunRecord>,

    /// Plain-language summary across projects
    #[serde(default)]
    pub summary: String,
}

impl RunManifest {
    pub fn new(invocation_id: Uuid, run_dir: PathBuf) -> Self {
        Self {
            invocation_id,
            run_dir,
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            summary: String::new(),
        }
    }

    /// Load a manifest written by a previous run
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    pub fn record(&self, project: ProjectId) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.project == project)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn projects(&self) -> Vec<ProjectId> {
        self.records.iter().map(|r| r.project).collect()
    }
}
