//! Run Policy Property Tests
//!
//! Real execution only ever follows from a complete capability report, and
//! no capability combination makes the policy skip a selected project.

use adrunner::core::registry::ToolPaths;
use adrunner::core::{decide, Registry};
use adrunner::domain::{CapabilityReport, Decision, ProjectId};
use proptest::prelude::*;

fn arb_project() -> impl Strategy<Value = ProjectId> {
    prop::sample::select(ProjectId::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tool_absent_never_runs_real(
        project in arb_project(),
        source in any::<bool>(),
        data in any::<bool>(),
    ) {
        let registry = Registry::new("/ws", ToolPaths::default());
        let report = CapabilityReport::from_flags(project, source, false, data);

        let d = decide(registry.spec(project), &report, true);

        prop_assert_ne!(d.decision, Decision::RunReal);
    }

    #[test]
    fn selected_projects_are_never_skipped(
        project in arb_project(),
        source in any::<bool>(),
        tool in any::<bool>(),
        data in any::<bool>(),
    ) {
        let registry = Registry::new("/ws", ToolPaths::default());
        let report = CapabilityReport::from_flags(project, source, tool, data);

        let d = decide(registry.spec(project), &report, true);

        prop_assert_ne!(d.decision, Decision::Skip);
        prop_assert!(!d.reasons.is_empty());

        let expect_real = source && tool && data && registry.spec(project).has_real_command();
        prop_assert_eq!(d.decision == Decision::RunReal, expect_real);
    }
}

#[test]
fn test_all_satisfied_runs_real_for_allow_listed_projects() {
    let registry = Registry::new("/ws", ToolPaths::default());

    for spec in registry.specs() {
        let d = decide(spec, &CapabilityReport::satisfied(spec.id), true);
        if spec.has_real_command() {
            assert_eq!(d.decision, Decision::RunReal, "{}", spec.id);
        } else {
            assert_eq!(d.decision, Decision::RunSimulated, "{}", spec.id);
        }
    }
}

#[test]
fn test_source_absent_simulates() {
    let registry = Registry::new("/ws", ToolPaths::default());

    for id in ProjectId::ALL {
        let report = CapabilityReport::from_flags(id, false, true, true);
        let d = decide(registry.spec(id), &report, true);
        assert_eq!(d.decision, Decision::RunSimulated, "{}", id);
    }
}
