//! Timeout Integration Tests
//!
//! A real command that outlives the soft timeout is killed along with its
//! descendants, recorded as failed, and keeps the output it produced before
//! the deadline. A command that exits on time is judged by its own status.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

use adrunner::core::registry::ToolPaths;
use adrunner::core::{ExecutionLimits, Orchestrator, Registry};
use adrunner::domain::{FailureKind, Outcome};
use tempfile::TempDir;

fn lead_workspace(temp: &TempDir) {
    let lead = temp.path().join("workspace/LEAD");
    std::fs::create_dir_all(lead.join("dataset")).unwrap();
    std::fs::write(lead.join("run.py"), "print('lead')").unwrap();
}

fn fake_python(temp: &TempDir, name: &str, body: &str) -> String {
    let path = temp.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

fn slow_python(temp: &TempDir) -> String {
    fake_python(temp, "slow-python", "echo started\nexec sleep 30")
}

fn lead_orchestrator(temp: &TempDir, python: String, timeout_seconds: u64) -> Orchestrator {
    let tools = ToolPaths {
        python,
        ..Default::default()
    };
    Orchestrator::new(
        Registry::new(temp.path().join("workspace"), tools),
        ExecutionLimits {
            timeout_seconds,
            ..Default::default()
        },
        temp.path().join("outputs"),
    )
}

#[tokio::test]
async fn test_command_over_soft_timeout_is_failed() {
    let temp = TempDir::new().unwrap();
    lead_workspace(&temp);
    let orch = lead_orchestrator(&temp, slow_python(&temp), 1);

    let started = Instant::now();
    let manifest = orch.run(&["LEAD"], None, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    let record = &manifest.records[0];
    assert_eq!(record.outcome, Outcome::Failed);
    assert_eq!(
        record.failure,
        Some(FailureKind::ExecutionTimeout { timeout_seconds: 1 })
    );
    assert!(record.stdout.contains("started"));
    assert_eq!(record.exit_code, None);

    let log = std::fs::read_to_string(&record.log_path).unwrap();
    assert!(log.contains("started"));
    assert!(log.contains("Outcome: failed"));
}

#[tokio::test]
async fn test_timeout_leaves_no_descendant_running() {
    let temp = TempDir::new().unwrap();
    lead_workspace(&temp);
    let marker = temp.path().join("grandchild-finished");
    let python = fake_python(
        &temp,
        "forking-python",
        &format!("echo started\nsh -c 'sleep 3; touch {}'\necho done", marker.display()),
    );

    let manifest = lead_orchestrator(&temp, python, 1)
        .run(&["LEAD"], None, None)
        .await
        .unwrap();

    let record = &manifest.records[0];
    assert_eq!(
        record.failure,
        Some(FailureKind::ExecutionTimeout { timeout_seconds: 1 })
    );
    assert!(record.stdout.contains("started"));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!marker.exists(), "descendant outlived the timeout");
}

#[tokio::test]
async fn test_exit_zero_with_descendant_holding_pipes_is_executed() {
    let temp = TempDir::new().unwrap();
    lead_workspace(&temp);
    let python = fake_python(&temp, "daemonizing-python", "echo ok\nsleep 20 &\nexit 0");

    let started = Instant::now();
    let manifest = lead_orchestrator(&temp, python, 10)
        .run(&["LEAD"], None, None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(8));
    let record = &manifest.records[0];
    assert_eq!(record.outcome, Outcome::Executed);
    assert_eq!(record.exit_code, Some(0));
    assert_eq!(record.failure, None);
    assert!(record.stdout.contains("ok"));
}

#[test]
fn test_limits_defaults() {
    let limits = ExecutionLimits::default();
    assert_eq!(limits.timeout(), Duration::from_secs(600));
    assert_eq!(limits.max_capture_bytes, 1024 * 1024);
}
