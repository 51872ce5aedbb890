//! Core orchestration logic.
//!
//! This module contains:
//! - Registry: the declarative project table and its allow-list
//! - Probe: read-only capability checks
//! - Policy: real vs. simulated vs. skip
//! - Limits: timeout and capture ceilings
//! - Engine: subprocess and simulation execution
//! - Collector: timestamped run directories, logs, manifests
//! - Orchestrator: sequences all of the above

pub mod collector;
pub mod engine;
pub mod limits;
pub mod orchestrator;
pub mod policy;
pub mod probe;
pub mod registry;

// Re-export commonly used types
pub use collector::{list_runs, OutputWriteError, ProjectScope, RunDirectory};
pub use engine::{Action, Execution, ExecutionEngine, Executor, RealAction, SimulatedAction};
pub use limits::{CaptureTracker, ExecutionLimits};
pub use orchestrator::{Orchestrator, RunnerError};
pub use policy::{decide, plan, PolicyDecision};
pub use probe::{discover_subjects, probe};
pub use registry::{Invocation, ProjectSpec, Registry, Tool, ToolPaths};
