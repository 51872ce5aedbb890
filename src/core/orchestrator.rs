//! Main orchestrator for a run over the selected projects.
//!
//! Sequences probe, policy, execution and collection for each project, one at
//! a time, and produces the run manifest. Per-project failures end up in the
//! project's record; only unknown identifiers and unwritable output abort.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Decision, FailureKind, Outcome, ProjectId, RunEvent, RunManifest, RunRecord,
    UnknownProjectError,
};
use crate::report;
use crate::simulation::DISCLAIMER;

use super::collector::{OutputWriteError, ProjectScope, RunDirectory};
use super::engine::{Action, ExecutionEngine, Executor, RealAction};
use super::limits::ExecutionLimits;
use super::policy::{self, PolicyDecision};
use super::probe;
use super::registry::{ProjectSpec, Registry};

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    UnknownProject(#[from] UnknownProjectError),

    #[error(transparent)]
    OutputWrite(#[from] OutputWriteError),
}

/// Asked before each real execution; returning false skips the project
pub type ConfirmFn<'a> = &'a mut (dyn FnMut(&ProjectSpec, &RealAction) -> bool + Send);

/// Receives every progress event, including output lines
pub type EventFn<'a> = &'a mut (dyn FnMut(&RunEvent) + Send);

/// Runs selected projects into timestamped run directories
pub struct Orchestrator {
    registry: Registry,

    executor: Box<dyn Executor>,

    /// Parent of all run directories
    output_base: PathBuf,
}

impl Orchestrator {
    /// Orchestrator using the subprocess/simulation engine
    pub fn new(registry: Registry, limits: ExecutionLimits, output_base: impl Into<PathBuf>) -> Self {
        Self::with_executor(registry, Box::new(ExecutionEngine::new(limits)), output_base)
    }

    pub fn with_executor(
        registry: Registry,
        executor: Box<dyn Executor>,
        output_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            executor,
            output_base: output_base.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn output_base(&self) -> &Path {
        &self.output_base
    }

    /// Resolve a selection. Empty means every registered project;
    /// duplicates keep their first position.
    pub fn resolve_selection<S: AsRef<str>>(
        &self,
        selected: &[S],
    ) -> Result<Vec<ProjectId>, UnknownProjectError> {
        if selected.is_empty() {
            return Ok(self.registry.ids());
        }

        let mut ids = Vec::with_capacity(selected.len());
        for name in selected {
            let id = self.registry.lookup(name.as_ref())?.id;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Run the selected projects and return the written manifest
    #[instrument(skip_all, fields(executor = %self.executor.name()))]
    pub async fn run<S: AsRef<str>>(
        &self,
        selected: &[S],
        mut confirm: Option<ConfirmFn<'_>>,
        mut on_event: Option<EventFn<'_>>,
    ) -> Result<RunManifest, RunnerError> {
        let ids = self.resolve_selection(selected)?;

        let run_dir = RunDirectory::create(&self.output_base).await?;
        let mut manifest = RunManifest::new(Uuid::new_v4(), run_dir.path().to_path_buf());
        info!(
            invocation_id = %manifest.invocation_id,
            run_dir = %run_dir.path().display(),
            projects = ids.len(),
            "Starting run"
        );

        emit(
            &run_dir,
            &mut on_event,
            RunEvent::RunStarted {
                invocation_id: manifest.invocation_id,
                run_dir: run_dir.path().to_path_buf(),
                projects: ids.clone(),
                timestamp: Utc::now(),
            },
        )
        .await?;

        let total = ids.len();
        for (index, id) in ids.into_iter().enumerate() {
            emit(
                &run_dir,
                &mut on_event,
                RunEvent::ProjectStarted {
                    project: id,
                    index: index + 1,
                    total,
                    timestamp: Utc::now(),
                },
            )
            .await?;

            let record = self
                .run_project(&run_dir, id, &mut confirm, &mut on_event)
                .await?;

            info!(project = %id, outcome = record.outcome.as_str(), "Project finished");
            emit(
                &run_dir,
                &mut on_event,
                RunEvent::ProjectFinished {
                    project: id,
                    outcome: record.outcome,
                    exit_code: record.exit_code,
                    timestamp: Utc::now(),
                },
            )
            .await?;

            manifest.records.push(record);
        }

        manifest.summary = report::final_summary(&manifest);
        manifest.finished_at = Some(Utc::now());
        let manifest_path = run_dir.write_manifest(&manifest).await?;

        emit(
            &run_dir,
            &mut on_event,
            RunEvent::RunFinished {
                invocation_id: manifest.invocation_id,
                manifest_path,
                timestamp: Utc::now(),
            },
        )
        .await?;

        Ok(manifest)
    }

    async fn run_project(
        &self,
        run_dir: &RunDirectory,
        id: ProjectId,
        confirm: &mut Option<ConfirmFn<'_>>,
        on_event: &mut Option<EventFn<'_>>,
    ) -> Result<RunRecord, RunnerError> {
        let spec = self.registry.spec(id);
        let scope = run_dir.project_scope(id).await?;

        let report = probe::probe(&self.registry, id);
        let decision = policy::decide(spec, &report, true);

        let mut record = RunRecord::start(id, report.clone(), scope.log_path().to_path_buf());
        record.notes.extend(decision.reasons.iter().cloned());

        emit(
            run_dir,
            on_event,
            RunEvent::Decision {
                project: id,
                decision: decision.decision,
                reasons: decision.reasons.clone(),
            },
        )
        .await?;
        write_decision(&scope, &decision).await?;

        let subjects = match decision.decision {
            Decision::RunSimulated => probe::discover_subjects(&self.registry, id),
            _ => Vec::new(),
        };

        let Some(action) = policy::plan(&self.registry, &decision, &report, scope.dir(), subjects)
        else {
            let (outcome, failure) = match decision.decision {
                Decision::RunSimulated => (
                    Outcome::Failed,
                    Some(FailureKind::SimulationError {
                        message: "No simulation generator registered".to_string(),
                    }),
                ),
                _ => (Outcome::Skipped, None),
            };
            scope.append_log("No action taken\n").await?;
            record.finish(outcome, None, failure);
            return Ok(record);
        };

        match action {
            Action::Real(ref real) => {
                let approved = match confirm.as_mut() {
                    Some(ask) => ask(spec, real),
                    None => true,
                };
                if !approved {
                    info!(project = %id, "Real execution declined");
                    record.notes.push("Real execution declined at confirmation".to_string());
                    scope.append_log("Skipped: real execution declined\n").await?;
                    record.finish(Outcome::Skipped, None, None);
                    return Ok(record);
                }

                let mut header = String::new();
                for invocation in real.invocations() {
                    header.push_str(&format!("Command: {}\n", invocation.display()));
                }
                header.push_str(&format!("Working dir: {}\n\n", real.working_dir().display()));
                scope.append_log(&header).await?;
            }
            Action::Simulated(ref sim) => {
                scope
                    .append_log(&format!(
                        "Simulation: {} subject(s)\n{}\n\n",
                        sim.context.subjects.len(),
                        DISCLAIMER
                    ))
                    .await?;
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward = async {
            while let Some(line) = rx.recv().await {
                if let Some(f) = on_event.as_mut() {
                    f(&RunEvent::Output { project: id, line });
                }
            }
        };
        let (execution, ()) = tokio::join!(self.executor.execute(&action, tx), forward);

        scope.write_execution(&execution).await?;
        scope.write_generated(&execution.files).await?;

        if action.is_real() {
            let notes = scope
                .copy_known_outputs(&self.registry.source_dir(id), spec.collect)
                .await;
            record.notes.extend(notes);
        }

        if let Some(ref failure) = execution.failure {
            warn!(project = %id, error = %failure, "Project failed");
        }

        let (files, notes) = scope.produced_files().await;
        record.files = files;
        record.notes.extend(notes);
        record.stdout = execution.stdout;
        record.stderr = execution.stderr;
        record.truncated = execution.truncated;
        record.finish(execution.outcome, execution.exit_code, execution.failure);

        Ok(record)
    }
}

/// Persist status events, then hand the event to the caller
async fn emit(
    run_dir: &RunDirectory,
    on_event: &mut Option<EventFn<'_>>,
    event: RunEvent,
) -> Result<(), OutputWriteError> {
    if event.is_status() {
        run_dir.append_event(&event).await?;
    }
    if let Some(f) = on_event.as_mut() {
        f(&event);
    }
    Ok(())
}

async fn write_decision(
    scope: &ProjectScope,
    decision: &PolicyDecision,
) -> Result<(), OutputWriteError> {
    let mut text = format!(
        "Project: {}\nDecision: {}\n",
        scope.project(),
        decision.decision.as_str()
    );
    for reason in &decision.reasons {
        text.push_str(&format!("Reason: {}\n", reason));
    }
    scope.append_log(&text).await
}
