//! Run policy.
//!
//! Pure decision from a capability report to an action:
//! - unselected projects are skipped
//! - real execution requires every capability and an allow-listed command
//! - everything else is simulated, with the missing capabilities as reasons
//!
//! No capability combination ever yields `Skip`.

use std::path::Path;

use crate::domain::{Capability, CapabilityReport, Decision};
use crate::simulation::SimulationContext;

use super::engine::{Action, RealAction, SimulatedAction};
use super::registry::{ProjectSpec, Registry};

/// The decision for one project and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub decision: Decision,
    pub reasons: Vec<String>,
}

/// Decide what to do with a project
pub fn decide(spec: &ProjectSpec, report: &CapabilityReport, selected: bool) -> PolicyDecision {
    if !selected {
        return PolicyDecision {
            decision: Decision::Skip,
            reasons: vec!["Not selected".to_string()],
        };
    }

    let mut reasons: Vec<String> = report
        .missing()
        .into_iter()
        .map(|c| match c {
            Capability::Source => "Source files missing".to_string(),
            Capability::Tool => "Required tool not available".to_string(),
            Capability::Data => "Required data not present".to_string(),
        })
        .collect();

    if !spec.has_real_command() {
        reasons.push("No conservative command is allow-listed for this project".to_string());
    }

    if reasons.is_empty() {
        return PolicyDecision {
            decision: Decision::RunReal,
            reasons: vec!["All prerequisites present".to_string()],
        };
    }

    // Probe notes name the concrete file or tool
    reasons.extend(report.notes.iter().cloned());

    PolicyDecision {
        decision: Decision::RunSimulated,
        reasons,
    }
}

/// Build the action for a decision. `None` for `Skip`, or when a simulation
/// is called for but the project has no generator.
pub fn plan(
    registry: &Registry,
    decision: &PolicyDecision,
    report: &CapabilityReport,
    output_dir: &Path,
    subjects: Vec<String>,
) -> Option<Action> {
    let id = report.project;

    match decision.decision {
        Decision::Skip => None,
        Decision::RunReal => Some(Action::Real(RealAction::new(
            id,
            registry.invocations(id, output_dir, report),
            registry.source_dir(id),
            output_dir.to_path_buf(),
        ))),
        Decision::RunSimulated => registry.spec(id).simulate.map(|generator| {
            Action::Simulated(SimulatedAction {
                generator,
                context: SimulationContext::new(id, subjects, decision.reasons.clone()),
            })
        }),
    }
}
