//! Orchestrator Integration Tests
//!
//! End-to-end runs over temporary workspaces: simulated fallbacks, real
//! execution through fake tool scripts, and selection handling.

use std::path::{Path, PathBuf};

use adrunner::core::registry::ToolPaths;
use adrunner::core::{ExecutionLimits, Orchestrator, ProjectSpec, RealAction, Registry, RunnerError};
use adrunner::domain::{FailureKind, Outcome, ProjectId, RunEvent};
use adrunner::simulation::DISCLAIMER;
use tempfile::TempDir;

fn missing_tools() -> ToolPaths {
    ToolPaths {
        python: "adrunner-missing-python".to_string(),
        rscript: "adrunner-missing-rscript".to_string(),
        nbconvert: "adrunner-missing-nbconvert".to_string(),
    }
}

fn orchestrator(temp: &TempDir, tools: ToolPaths) -> Orchestrator {
    Orchestrator::new(
        Registry::new(temp.path().join("workspace"), tools),
        ExecutionLimits {
            timeout_seconds: 20,
            ..Default::default()
        },
        temp.path().join("outputs"),
    )
}

#[cfg(unix)]
fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn adni_workspace(temp: &TempDir) {
    let adni = temp.path().join("workspace/ADNI");
    std::fs::create_dir_all(adni.join("R")).unwrap();
    std::fs::write(adni.join("R/amyloid_pos.R"), "# amyloid").unwrap();
    std::fs::write(adni.join("R/stage1.R"), "# stage").unwrap();
}

#[tokio::test]
async fn test_lead_without_source_or_tool_is_simulated() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(&temp, missing_tools());

    let manifest = orch.run(&["LEAD"], None, None).await.unwrap();

    assert_eq!(manifest.records.len(), 1);
    let record = &manifest.records[0];
    assert_eq!(record.project, ProjectId::Lead);
    assert_eq!(record.outcome, Outcome::Simulated);
    assert!(!record.capabilities.source_present);
    assert!(!record.capabilities.tool_present);
    assert!(record.notes.iter().any(|n| n.contains("Source files missing")));

    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.contains(DISCLAIMER));
    assert!(log.contains("Decision: run_simulated"));

    let files: Vec<PathBuf> = record.files.iter().map(|f| f.path.clone()).collect();
    assert!(files.contains(&PathBuf::from("predictions.csv")));
    assert!(files.contains(&PathBuf::from("summary.json")));
    assert!(!files.contains(&PathBuf::from("run.log")));

    assert!(manifest.run_dir.join("manifest.json").is_file());
    assert!(manifest.run_dir.join("events.jsonl").is_file());
    assert!(manifest.summary.contains("LEAD: SIMULATED"));
}

#[tokio::test]
async fn test_one_record_per_project_in_selection_order() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(&temp, missing_tools());

    let manifest = orch
        .run(&["TADPOLE", "LEAD", "ADNI"], None, None)
        .await
        .unwrap();

    assert_eq!(
        manifest.projects(),
        vec![ProjectId::Tadpole, ProjectId::Lead, ProjectId::Adni]
    );
    for record in &manifest.records {
        assert_eq!(record.outcome, Outcome::Simulated);
        assert!(record.is_finished());
        assert!(manifest.run_dir.join(record.project.as_str()).is_dir());
    }
}

#[tokio::test]
async fn test_empty_selection_runs_every_project() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(&temp, missing_tools());

    let none: [&str; 0] = [];
    let manifest = orch.run(&none, None, None).await.unwrap();

    assert_eq!(manifest.projects(), ProjectId::ALL.to_vec());
}

#[tokio::test]
async fn test_unknown_project_creates_no_directory() {
    let temp = TempDir::new().unwrap();
    let orch = orchestrator(&temp, missing_tools());

    let result = orch.run(&["LEAD", "OASIS"], None, None).await;

    assert!(matches!(result, Err(RunnerError::UnknownProject(_))));
    assert!(!temp.path().join("outputs").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_adni_executes_with_available_tool() {
    let temp = TempDir::new().unwrap();
    adni_workspace(&temp);
    let figures = temp.path().join("workspace/ADNI/figures");
    std::fs::create_dir_all(&figures).unwrap();
    std::fs::write(figures.join("stage.png"), "png").unwrap();

    let rscript = fake_tool(
        &temp.path().join("bin"),
        "Rscript",
        r#"name=$(basename "$1")
echo "running $1"
echo "note from $name" 1>&2
echo ok > "$ADRUNNER_OUTPUT_DIR/$name.out""#,
    );
    let tools = ToolPaths {
        rscript: rscript.display().to_string(),
        ..missing_tools()
    };
    let orch = orchestrator(&temp, tools);

    let mut streamed = Vec::new();
    let mut on_event = |e: &RunEvent| {
        if let RunEvent::Output { line, .. } = e {
            streamed.push(line.text.clone());
        }
    };
    let manifest = orch.run(&["ADNI"], None, Some(&mut on_event)).await.unwrap();

    let record = &manifest.records[0];
    assert_eq!(record.outcome, Outcome::Executed, "notes: {:?}", record.notes);
    assert_eq!(record.exit_code, Some(0));
    assert!(record.stdout.contains("running R/amyloid_pos.R"));
    assert!(record.stdout.contains("running R/stage1.R"));
    assert!(record.stderr.contains("note from stage1.R"));
    assert!(streamed.iter().any(|l| l == "running R/stage1.R"));

    let files: Vec<PathBuf> = record.files.iter().map(|f| f.path.clone()).collect();
    assert!(files.contains(&PathBuf::from("amyloid_pos.R.out")));
    assert!(files.contains(&PathBuf::from("stage1.R.out")));
    assert!(files.contains(&PathBuf::from("figures/stage.png")));
    assert!(record.files.iter().all(|f| f.sha256.len() == 64));

    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.contains("Command: "));
    assert!(log.contains("Working dir: "));
    assert!(log.contains("[stderr] note from amyloid_pos.R"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_zero_exit_is_failed() {
    let temp = TempDir::new().unwrap();
    adni_workspace(&temp);
    let rscript = fake_tool(
        &temp.path().join("bin"),
        "Rscript",
        "echo 'Error in library(x)' 1>&2\nexit 2",
    );
    let tools = ToolPaths {
        rscript: rscript.display().to_string(),
        ..missing_tools()
    };
    let orch = orchestrator(&temp, tools);

    let manifest = orch.run(&["ADNI"], None, None).await.unwrap();

    let record = &manifest.records[0];
    assert_eq!(record.outcome, Outcome::Failed);
    assert_eq!(record.exit_code, Some(2));
    assert!(matches!(record.failure, Some(FailureKind::NonZeroExit { .. })));
    assert!(record.stderr.contains("Error in library"));
    assert!(manifest.run_dir.join("manifest.json").is_file());
}

#[cfg(unix)]
#[tokio::test]
async fn test_declined_confirmation_skips() {
    let temp = TempDir::new().unwrap();
    adni_workspace(&temp);
    let rscript = fake_tool(&temp.path().join("bin"), "Rscript", "echo should-not-run");
    let tools = ToolPaths {
        rscript: rscript.display().to_string(),
        ..missing_tools()
    };
    let orch = orchestrator(&temp, tools);

    let mut seen = Vec::new();
    let mut confirm = |spec: &ProjectSpec, action: &RealAction| {
        seen.push((spec.id, action.invocations().len()));
        false
    };
    let manifest = orch
        .run(&["ADNI", "LEAD"], Some(&mut confirm), None)
        .await
        .unwrap();

    assert_eq!(seen, vec![(ProjectId::Adni, 2)]);
    assert_eq!(manifest.records[0].outcome, Outcome::Skipped);
    assert!(manifest.records[0].stdout.is_empty());
    assert!(manifest.records[0].notes.iter().any(|n| n.contains("declined")));
    assert_eq!(manifest.records[1].outcome, Outcome::Simulated);
}
