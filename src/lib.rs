//! adrunner - conservative runner for external research pipelines
//!
//! Runs a fixed set of independently developed research projects with
//! low-cost, allow-listed invocations, collects whatever they produce into a
//! timestamped run directory, and substitutes a clearly labeled simulated
//! result whenever a project's code, tools or data are unavailable.
//!
//! # Architecture
//!
//! Each run is a sequence of per-project steps:
//! - probe the environment (source, tool, data)
//! - decide real vs. simulated
//! - execute the allow-listed command or the simulation generator
//! - collect logs and produced files, then record the outcome
//!
//! Every run ends with a `manifest.json` holding one record per project.
//!
//! # Modules
//!
//! - `core`: Registry, probe, policy, engine, collector, orchestrator
//! - `domain`: Data structures (ProjectId, CapabilityReport, RunRecord, RunEvent)
//! - `simulation`: Deterministic synthetic outputs
//! - `report`: Run summaries and per-subject ensemble predictions
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run everything that can run, simulate the rest
//! adrunner run --no-confirm
//!
//! # Only two projects, with a custom interpreter
//! adrunner run --projects LEAD,ADNI --python /opt/py311/bin/python
//!
//! # What would happen, without running anything
//! adrunner probe
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod report;
pub mod simulation;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, Registry, RunnerError};
pub use domain::{CapabilityReport, Outcome, ProjectId, RunEvent, RunManifest, RunRecord};
