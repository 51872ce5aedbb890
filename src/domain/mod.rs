//! Domain types for the runner.
//!
//! This module contains the core data structures:
//! - Project: the closed set of project identifiers
//! - Capability: probe findings
//! - Run: per-project records and the run manifest
//! - Events: streamed progress updates
//! - Artifact: files produced by a run

pub mod artifact;
pub mod capability;
pub mod events;
pub mod project;
pub mod run;

// Re-export commonly used types
pub use artifact::{GeneratedFile, ProducedFile};
pub use capability::{Capability, CapabilityReport};
pub use events::{OutputLine, OutputStream, RunEvent};
pub use project::{parse_selection, ProjectId, UnknownProjectError};
pub use run::{Decision, FailureKind, Outcome, RunManifest, RunRecord};
