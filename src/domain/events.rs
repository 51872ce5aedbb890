//! Progress events streamed to callers during an orchestration run.
//!
//! Status events are also persisted as JSONL in the run directory so a
//! finished run can be inspected without the live stream.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::ProjectId;
use super::run::{Decision, Outcome};

/// Which pipe a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of captured output (without its trailing newline)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// An incremental status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run directory exists and projects are about to be processed
    RunStarted {
        invocation_id: Uuid,
        run_dir: PathBuf,
        projects: Vec<ProjectId>,
        timestamp: DateTime<Utc>,
    },

    /// A project is being probed
    ProjectStarted {
        project: ProjectId,
        /// 1-based position in the selection
        index: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run policy picked an action for the project
    Decision {
        project: ProjectId,
        decision: Decision,
        reasons: Vec<String>,
    },

    /// A line of project output, forwarded as it arrives
    Output {
        project: ProjectId,
        line: OutputLine,
    },

    /// A project reached its final outcome
    ProjectFinished {
        project: ProjectId,
        outcome: Outcome,
        exit_code: Option<i32>,
        timestamp: DateTime<Utc>,
    },

    /// The manifest has been written
    RunFinished {
        invocation_id: Uuid,
        manifest_path: PathBuf,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Output lines are streamed but not persisted to the event log
    pub fn is_status(&self) -> bool {
        !matches!(self, RunEvent::Output { .. })
    }

    /// Project this event concerns, if any
    pub fn project(&self) -> Option<ProjectId> {
        match self {
            RunEvent::ProjectStarted { project, .. }
            | RunEvent::Decision { project, .. }
            | RunEvent::Output { project, .. }
            | RunEvent::ProjectFinished { project, .. } => Some(*project),
            RunEvent::RunStarted { .. } | RunEvent::RunFinished { .. } => None,
        }
    }
}
