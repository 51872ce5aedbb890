//! Execution engine.
//!
//! Runs one [`Action`]: either the allow-listed subprocess invocations of a
//! project, or its simulation generator. Output is captured line by line from
//! both pipes and pushed onto a channel as it arrives so callers can stream
//! it; ordering between stdout and stderr is by arrival only.
//!
//! Real executions share one soft deadline across all their invocations.
//! Each invocation runs in its own process group. When the deadline passes
//! the whole group is killed and the child reaped, and whatever output was
//! already captured is kept. A child that exits normally ends its invocation
//! even if a descendant still holds its pipes; leftover group members are
//! killed then too.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::domain::{FailureKind, GeneratedFile, OutputLine, OutputStream, Outcome, ProjectId};
use crate::simulation::{SimulationContext, SimulationFn};

use super::limits::{CaptureTracker, ExecutionLimits};
use super::registry::Invocation;

/// Environment variable naming the project's output subdirectory
pub const ENV_OUTPUT_DIR: &str = "ADRUNNER_OUTPUT_DIR";

/// Environment variable naming the project being run
pub const ENV_PROJECT: &str = "ADRUNNER_PROJECT";

/// How long lines already in flight are still collected after the child exits
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Allow-listed subprocess invocations for one project.
///
/// Only the policy builds these, from registry templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealAction {
    project: ProjectId,
    invocations: Vec<Invocation>,
    working_dir: PathBuf,
    output_dir: PathBuf,
}

impl RealAction {
    pub(crate) fn new(
        project: ProjectId,
        invocations: Vec<Invocation>,
        working_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            project,
            invocations,
            working_dir,
            output_dir,
        }
    }

    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// A simulation generator with its inputs
#[derive(Clone)]
pub struct SimulatedAction {
    pub generator: SimulationFn,
    pub context: SimulationContext,
}

impl fmt::Debug for SimulatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedAction")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// What the engine should do for a project
#[derive(Debug, Clone)]
pub enum Action {
    Real(RealAction),
    Simulated(SimulatedAction),
}

impl Action {
    pub fn is_real(&self) -> bool {
        matches!(self, Action::Real(_))
    }
}

/// Result of executing one action
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Outcome,

    /// Retained lines in arrival order
    pub lines: Vec<OutputLine>,

    pub stdout: String,

    pub stderr: String,

    /// Whether lines were dropped at the capture ceiling
    pub truncated: bool,

    pub exit_code: Option<i32>,

    pub failure: Option<FailureKind>,

    /// Files a simulation wants written (empty for real runs)
    pub files: Vec<GeneratedFile>,
}

/// Something that can carry out an [`Action`]
#[async_trait]
pub trait Executor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Execute the action, sending each output line to `sink` as it arrives.
    /// Failures are reported in the returned [`Execution`], never as panics.
    async fn execute(&self, action: &Action, sink: UnboundedSender<OutputLine>) -> Execution;
}

/// Retains captured output under the configured ceiling
struct Capture {
    tracker: CaptureTracker,
    lines: Vec<OutputLine>,
    stdout: String,
    stderr: String,
    sink: UnboundedSender<OutputLine>,
}

impl Capture {
    fn new(limits: &ExecutionLimits, sink: UnboundedSender<OutputLine>) -> Self {
        Self {
            tracker: CaptureTracker::new(limits),
            lines: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            sink,
        }
    }

    fn record(&mut self, line: OutputLine) {
        // A closed sink only means nobody is listening
        let _ = self.sink.send(line.clone());

        if !self.tracker.admit(line.stream, line.text.len()) {
            return;
        }

        let buf = match line.stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.push_str(&line.text);
        buf.push('\n');
        self.lines.push(line);
    }

    fn finish(
        self,
        outcome: Outcome,
        exit_code: Option<i32>,
        failure: Option<FailureKind>,
        files: Vec<GeneratedFile>,
    ) -> Execution {
        Execution {
            outcome: if failure.is_some() {
                Outcome::Failed
            } else {
                outcome
            },
            lines: self.lines,
            stdout: self.stdout,
            stderr: self.stderr,
            truncated: self.tracker.truncated,
            exit_code,
            failure,
            files,
        }
    }
}

/// Subprocess and simulation executor
pub struct ExecutionEngine {
    limits: ExecutionLimits,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl ExecutionEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    #[instrument(skip(self, action, sink), fields(project = %action.project))]
    async fn run_real(&self, action: &RealAction, sink: UnboundedSender<OutputLine>) -> Execution {
        let mut capture = Capture::new(&self.limits, sink);
        let deadline = Instant::from_std(self.limits.deadline());
        let timeout_seconds = self.limits.effective_timeout_seconds();
        let mut exit_code = None;

        for invocation in &action.invocations {
            let command_line = invocation.display();
            info!(command = %command_line, "Spawning conservative command");

            let mut command = Command::new(&invocation.program);
            command
                .args(&invocation.args)
                .current_dir(&action.working_dir)
                .env(ENV_OUTPUT_DIR, &action.output_dir)
                .env(ENV_PROJECT, action.project.as_str())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            #[cfg(unix)]
            command.process_group(0);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(command = %command_line, error = %e, "Failed to spawn");
                    let failure = FailureKind::SpawnFailed {
                        command: command_line,
                        message: e.to_string(),
                    };
                    return capture.finish(Outcome::Failed, exit_code, Some(failure), Vec::new());
                }
            };
            let pid = child.id();

            let (line_tx, mut line_rx) = mpsc::unbounded_channel();
            let mut readers: Vec<JoinHandle<()>> = Vec::new();
            if let Some(stdout) = child.stdout.take() {
                readers.push(tokio::spawn(read_lines(stdout, OutputStream::Stdout, line_tx.clone())));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(tokio::spawn(read_lines(stderr, OutputStream::Stderr, line_tx.clone())));
            }
            drop(line_tx);

            // The child's exit ends the wait even if a descendant still holds the pipes
            let waited = tokio::time::timeout_at(deadline, async {
                loop {
                    tokio::select! {
                        Some(line) = line_rx.recv() => capture.record(line),
                        status = child.wait() => break status,
                    }
                }
            })
            .await;

            if waited.is_ok() {
                let drain_until = (Instant::now() + EXIT_DRAIN_GRACE).min(deadline);
                while let Ok(Some(line)) = tokio::time::timeout_at(drain_until, line_rx.recv()).await {
                    capture.record(line);
                }
            }

            kill_process_group(pid);
            for reader in &readers {
                reader.abort();
            }
            while let Ok(line) = line_rx.try_recv() {
                capture.record(line);
            }

            match waited {
                Ok(Ok(status)) => {
                    exit_code = status.code();
                    debug!(command = %command_line, %status, "Command exited");
                    if !status.success() {
                        let failure = FailureKind::NonZeroExit {
                            command: command_line,
                            status: status.to_string(),
                        };
                        return capture.finish(Outcome::Failed, exit_code, Some(failure), Vec::new());
                    }
                }
                Ok(Err(e)) => {
                    let failure = FailureKind::SpawnFailed {
                        command: command_line,
                        message: format!("failed to wait for process: {e}"),
                    };
                    return capture.finish(Outcome::Failed, exit_code, Some(failure), Vec::new());
                }
                Err(_) => {
                    warn!(
                        command = %command_line,
                        timeout_seconds,
                        "Soft timeout reached, terminated process group"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed out process");
                    }
                    let failure = FailureKind::ExecutionTimeout { timeout_seconds };
                    return capture.finish(Outcome::Failed, None, Some(failure), Vec::new());
                }
            }
        }

        capture.finish(Outcome::Executed, exit_code, None, Vec::new())
    }

    fn run_simulated(&self, action: &SimulatedAction, sink: UnboundedSender<OutputLine>) -> Execution {
        let mut capture = Capture::new(&self.limits, sink);
        let generator = action.generator;
        let context = &action.context;

        let result = std::panic::catch_unwind(|| generator(context));

        let message = match result {
            Ok(Ok(output)) => {
                for line in output.lines {
                    capture.record(OutputLine::stdout(line));
                }
                return capture.finish(Outcome::Simulated, None, None, output.files);
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .map(|s| format!("generator panicked: {s}"))
                .unwrap_or_else(|| "generator panicked".to_string()),
        };

        warn!(project = %context.project, error = %message, "Simulation failed");
        capture.record(OutputLine::stderr(message.clone()));
        capture.finish(
            Outcome::Failed,
            None,
            Some(FailureKind::SimulationError { message }),
            Vec::new(),
        )
    }
}

#[async_trait]
impl Executor for ExecutionEngine {
    fn name(&self) -> &str {
        "engine"
    }

    async fn execute(&self, action: &Action, sink: UnboundedSender<OutputLine>) -> Execution {
        match action {
            Action::Real(real) => self.run_real(real, sink).await,
            Action::Simulated(sim) => self.run_simulated(sim, sink),
        }
    }
}

/// SIGKILL every process left in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "Killed process group"),
        // Nothing left in the group
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Forward each line of `reader` to `tx`. Invalid UTF-8 is replaced rather
/// than ending the stream.
async fn read_lines<R>(reader: R, stream: OutputStream, tx: UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c: char| c == '\n' || c == '\r')
                    .to_string();
                if tx.send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
        }
    }
}
