//! Output collection with timestamped isolation.
//!
//! Layout of one orchestration run:
//!
//! ```text
//! <output-base>/<YYYYmmdd_HHMMSS_mmm>/
//!     events.jsonl          append-only status events
//!     manifest.json         terminal artifact
//!     <project-id>/
//!         run.log           append-only log
//!         ...               files produced by the project
//! ```
//!
//! Leaf directories are created non-recursively, so a second invocation that
//! lands on the same timestamp fails instead of sharing a directory.

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{
    GeneratedFile, OutputStream, ProducedFile, ProjectId, RunEvent, RunManifest,
};

use super::engine::Execution;

/// Name of the per-project log file
pub const LOG_FILE: &str = "run.log";

/// Name of the manifest file in the run directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Name of the event log in the run directory
pub const EVENTS_FILE: &str = "events.jsonl";

/// The run directory (or something under it) could not be written
#[derive(Debug, Error)]
#[error("Failed to write {}: {source}", path.display())]
pub struct OutputWriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl OutputWriteError {
    fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Directory name for a run started at `at`
pub fn run_dir_name(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// One orchestration run's directory
#[derive(Debug)]
pub struct RunDirectory {
    root: PathBuf,
    events_path: PathBuf,
}

impl RunDirectory {
    /// Create a fresh run directory under `output_base`
    pub async fn create(output_base: &Path) -> Result<Self, OutputWriteError> {
        fs::create_dir_all(output_base)
            .await
            .map_err(|e| OutputWriteError::new(output_base, e))?;

        let root = output_base.join(run_dir_name(Local::now()));
        fs::create_dir(&root)
            .await
            .map_err(|e| OutputWriteError::new(&root, e))?;

        debug!(run_dir = %root.display(), "Created run directory");

        Ok(Self {
            events_path: root.join(EVENTS_FILE),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Create the project's subdirectory and its log file
    pub async fn project_scope(&self, project: ProjectId) -> Result<ProjectScope, OutputWriteError> {
        let dir = self.root.join(project.as_str());
        fs::create_dir(&dir)
            .await
            .map_err(|e| OutputWriteError::new(&dir, e))?;

        let log_path = dir.join(LOG_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| OutputWriteError::new(&log_path, e))?;

        let scope = ProjectScope {
            project,
            dir,
            log_path,
            baseline: BTreeSet::new(),
        };
        let baseline = scope.snapshot();

        Ok(ProjectScope { baseline, ..scope })
    }

    /// Append a status event as one JSON line
    pub async fn append_event(&self, event: &RunEvent) -> Result<(), OutputWriteError> {
        let json = serde_json::to_string(event)
            .map_err(|e| OutputWriteError::new(&self.events_path, io::Error::other(e)))?;

        append(&self.events_path, format!("{}\n", json).as_bytes()).await
    }

    /// Write the manifest, replacing any previous copy
    pub async fn write_manifest(&self, manifest: &RunManifest) -> Result<PathBuf, OutputWriteError> {
        let path = self.manifest_path();
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| OutputWriteError::new(&path, io::Error::other(e)))?;

        fs::write(&path, json)
            .await
            .map_err(|e| OutputWriteError::new(&path, e))?;

        Ok(path)
    }
}

/// A project's subdirectory within a run
#[derive(Debug)]
pub struct ProjectScope {
    project: ProjectId,

    dir: PathBuf,

    log_path: PathBuf,

    /// Files present before the project's action ran
    baseline: BTreeSet<PathBuf>,
}

impl ProjectScope {
    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append raw text to run.log
    pub async fn append_log(&self, text: &str) -> Result<(), OutputWriteError> {
        append(&self.log_path, text.as_bytes()).await
    }

    /// Append captured output, prefixing stderr lines, followed by a footer
    pub async fn write_execution(&self, execution: &Execution) -> Result<(), OutputWriteError> {
        let mut text = String::new();
        for line in &execution.lines {
            if line.stream == OutputStream::Stderr {
                text.push_str("[stderr] ");
            }
            text.push_str(&line.text);
            text.push('\n');
        }
        if execution.truncated {
            text.push_str("[output truncated at capture limit]\n");
        }

        text.push('\n');
        text.push_str(&format!("Outcome: {}\n", execution.outcome.as_str()));
        if let Some(code) = execution.exit_code {
            text.push_str(&format!("Exit code: {}\n", code));
        }
        if let Some(ref failure) = execution.failure {
            text.push_str(&format!("Failure: {}\n", failure));
        }

        self.append_log(&text).await
    }

    /// Write simulation output files into the subdirectory
    pub async fn write_generated(&self, files: &[GeneratedFile]) -> Result<(), OutputWriteError> {
        for file in files {
            let relative = Path::new(&file.name);
            let path = self.dir.join(relative);

            if !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(OutputWriteError::new(
                    path,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "generated file name must stay inside the project directory",
                    ),
                ));
            }

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OutputWriteError::new(parent, e))?;
            }
            fs::write(&path, &file.contents)
                .await
                .map_err(|e| OutputWriteError::new(&path, e))?;
        }
        Ok(())
    }

    /// Copy a project's known output folders into the subdirectory.
    ///
    /// Missing folders are ignored. Copy problems are returned as notes
    /// rather than errors since the source tree belongs to the project.
    pub async fn copy_known_outputs(&self, source_dir: &Path, folders: &[&str]) -> Vec<String> {
        let mut notes = Vec::new();

        for folder in folders {
            let src = source_dir.join(folder);
            if !src.is_dir() {
                continue;
            }

            match copy_tree(&src, &self.dir.join(folder)).await {
                Ok(count) => notes.push(format!("Collected {} file(s) from {}", count, folder)),
                Err(e) => {
                    warn!(project = %self.project, folder, error = %e, "Failed to collect outputs");
                    notes.push(format!("Failed to collect {}: {:#}", folder, e));
                }
            }
        }

        notes
    }

    /// All files currently under the subdirectory
    pub fn snapshot(&self) -> BTreeSet<PathBuf> {
        list_files(&self.dir)
    }

    /// Files created since the scope was opened, excluding run.log.
    ///
    /// Hashing runs on the blocking pool. A file that cannot be read is left
    /// out and reported in the returned notes.
    pub async fn produced_files(&self) -> (Vec<ProducedFile>, Vec<String>) {
        let dir = self.dir.clone();
        let log_path = self.log_path.clone();
        let baseline = self.baseline.clone();

        let listed = tokio::task::spawn_blocking(move || {
            let paths = list_files(&dir)
                .into_iter()
                .filter(|p| p != &log_path && !baseline.contains(p));
            describe_files(&dir, paths)
        })
        .await;

        listed.unwrap_or_else(|e| {
            warn!(project = %self.project, error = %e, "Listing produced files failed");
            (Vec::new(), vec![format!("Failed to list produced files: {}", e)])
        })
    }
}

/// Size and digest for each path; unreadable files become notes
fn describe_files(
    root: &Path,
    paths: impl IntoIterator<Item = PathBuf>,
) -> (Vec<ProducedFile>, Vec<String>) {
    let mut files = Vec::new();
    let mut notes = Vec::new();

    for path in paths {
        match ProducedFile::from_path(root, &path) {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable output file");
                notes.push(format!("Could not read produced file {}: {}", path.display(), e));
            }
        }
    }

    (files, notes)
}

/// Run directories under `output_base`, most recent first
pub fn list_runs(output_base: &Path) -> Result<Vec<PathBuf>> {
    if !output_base.exists() {
        return Ok(Vec::new());
    }

    let mut runs: Vec<PathBuf> = std::fs::read_dir(output_base)
        .with_context(|| format!("Failed to read output directory: {}", output_base.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.join(MANIFEST_FILE).is_file())
        .collect();

    // Timestamp names sort chronologically
    runs.sort();
    runs.reverse();
    Ok(runs)
}

async fn append(path: &Path, bytes: &[u8]) -> Result<(), OutputWriteError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| OutputWriteError::new(path, e))?;

    file.write_all(bytes)
        .await
        .map_err(|e| OutputWriteError::new(path, e))?;
    file.flush()
        .await
        .map_err(|e| OutputWriteError::new(path, e))
}

fn list_files(dir: &Path) -> BTreeSet<PathBuf> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));

    match glob::glob(&pattern) {
        Ok(paths) => paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => BTreeSet::new(),
    }
}

async fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut count = 0;

    for file in list_files(src) {
        let relative = file.strip_prefix(src).unwrap_or(&file);
        let target = dst.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(&file, &target)
            .await
            .with_context(|| format!("Failed to copy {}", file.display()))?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutputLine, Outcome};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn execution(lines: Vec<OutputLine>) -> Execution {
        Execution {
            outcome: Outcome::Executed,
            lines,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            exit_code: Some(0),
            failure: None,
            files: Vec::new(),
        }
    }

    #[test]
    fn test_run_dir_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(run_dir_name(at), "20240309_140507_000");
    }

    #[tokio::test]
    async fn test_scope_layout_and_log() {
        let temp = TempDir::new().unwrap();
        let run = RunDirectory::create(temp.path()).await.unwrap();
        let scope = run.project_scope(ProjectId::Adni).await.unwrap();

        assert_eq!(scope.dir(), run.path().join("ADNI"));
        assert!(scope.log_path().is_file());

        scope.append_log("Command: Rscript\n").await.unwrap();
        scope
            .write_execution(&execution(vec![
                OutputLine::stdout("hello"),
                OutputLine::stderr("warning"),
            ]))
            .await
            .unwrap();

        let log = std::fs::read_to_string(scope.log_path()).unwrap();
        assert!(log.starts_with("Command: Rscript\n"));
        assert!(log.contains("hello\n[stderr] warning\n"));
        assert!(log.contains("Outcome: executed"));
        assert!(log.contains("Exit code: 0"));
    }

    #[tokio::test]
    async fn test_projects_never_share_a_subdirectory() {
        let temp = TempDir::new().unwrap();
        let run = RunDirectory::create(temp.path()).await.unwrap();

        run.project_scope(ProjectId::Lead).await.unwrap();
        assert!(run.project_scope(ProjectId::Lead).await.is_err());
    }

    #[tokio::test]
    async fn test_produced_files_exclude_log_and_baseline() {
        let temp = TempDir::new().unwrap();
        let run = RunDirectory::create(temp.path()).await.unwrap();
        let scope = run.project_scope(ProjectId::Lead).await.unwrap();

        scope
            .write_generated(&[
                GeneratedFile::new("summary.json", "{}"),
                GeneratedFile::new("nested/predictions.csv", "a,b\n"),
            ])
            .await
            .unwrap();

        let (files, notes) = scope.produced_files().await;
        assert!(notes.is_empty());
        let names: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("nested/predictions.csv"),
                PathBuf::from("summary.json")
            ]
        );
    }

    #[test]
    fn test_unreadable_output_becomes_note() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("ok.txt"), "ok").unwrap();

        let (files, notes) = describe_files(
            temp.path(),
            vec![temp.path().join("ok.txt"), temp.path().join("vanished.ckpt")],
        );

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("ok.txt"));
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("vanished.ckpt"));
    }

    #[tokio::test]
    async fn test_generated_names_cannot_escape() {
        let temp = TempDir::new().unwrap();
        let run = RunDirectory::create(temp.path()).await.unwrap();
        let scope = run.project_scope(ProjectId::Lead).await.unwrap();

        let result = scope
            .write_generated(&[GeneratedFile::new("../escape.txt", "x")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_copy_known_outputs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        std::fs::create_dir_all(source.join("figures/sub")).unwrap();
        std::fs::write(source.join("figures/a.png"), "a").unwrap();
        std::fs::write(source.join("figures/sub/b.png"), "b").unwrap();

        let run = RunDirectory::create(&temp.path().join("out")).await.unwrap();
        let scope = run.project_scope(ProjectId::AdBiomarkers).await.unwrap();

        let notes = scope
            .copy_known_outputs(&source, &["figures", "missing"])
            .await;

        assert_eq!(notes, vec!["Collected 2 file(s) from figures".to_string()]);
        assert!(scope.dir().join("figures/sub/b.png").is_file());
        assert_eq!(scope.produced_files().await.0.len(), 2);
    }

    #[tokio::test]
    async fn test_events_and_manifest() {
        let temp = TempDir::new().unwrap();
        let run = RunDirectory::create(temp.path()).await.unwrap();

        let manifest = RunManifest::new(uuid::Uuid::new_v4(), run.path().to_path_buf());
        let event = RunEvent::RunFinished {
            invocation_id: manifest.invocation_id,
            manifest_path: run.manifest_path(),
            timestamp: chrono::Utc::now(),
        };
        run.append_event(&event).await.unwrap();
        run.append_event(&event).await.unwrap();
        let path = run.write_manifest(&manifest).await.unwrap();

        let events = std::fs::read_to_string(run.path().join(EVENTS_FILE)).unwrap();
        assert_eq!(events.lines().count(), 2);

        let loaded = RunManifest::load(&path).unwrap();
        assert_eq!(loaded.invocation_id, manifest.invocation_id);

        assert_eq!(list_runs(temp.path()).unwrap(), vec![run.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn test_unwritable_base_is_an_error() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = RunDirectory::create(&file).await.unwrap_err();
        assert_eq!(err.path, file);
    }
}
