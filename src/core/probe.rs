//! Capability probing.
//!
//! Read-only checks of the environment: source files on disk, tools on the
//! search path, declared data paths. Nothing here executes project code or
//! the tools themselves, and nothing is cached between runs.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::domain::{CapabilityReport, ProjectId};

use super::registry::Registry;

/// Resolve an executable. Values containing a path separator are checked
/// as paths; bare names are looked up on PATH.
pub fn resolve_tool(executable: &str) -> Option<PathBuf> {
    which::which(executable).ok()
}

/// Probe one project
pub fn probe(registry: &Registry, id: ProjectId) -> CapabilityReport {
    let spec = registry.spec(id);
    let source_dir = registry.source_dir(id);
    let mut report = CapabilityReport::from_flags(id, true, true, true);

    if !source_dir.is_dir() {
        report.source_present = false;
        report
            .notes
            .push(format!("Source directory not found: {}", source_dir.display()));
    } else {
        for rel in spec.requires.source {
            let path = source_dir.join(rel);
            if !path.exists() {
                report.source_present = false;
                report.notes.push(format!("{} not found", rel));
            }
        }
    }

    for tool in spec.requires.tools {
        let executable = registry.tools().executable(*tool);
        match resolve_tool(executable) {
            Some(path) => {
                report.resolved_tools.insert(tool.name().to_string(), path);
            }
            None => {
                report.tool_present = false;
                report
                    .notes
                    .push(format!("{} not available on PATH ({})", executable, tool.name()));
            }
        }
    }

    for rel in spec.requires.data {
        let path = source_dir.join(rel);
        if !path.exists() {
            report.data_present = false;
            report
                .notes
                .push(format!("Data path not found: {}", path.display()));
        }
    }

    report.probed_at = Utc::now();
    debug!(
        project = %id,
        source = report.source_present,
        tool = report.tool_present,
        data = report.data_present,
        "Probed capabilities"
    );
    report
}

/// Subject identifiers inferred from a project's data files (file stems
/// matching the registry's subject glob). Empty when nothing matches.
pub fn discover_subjects(registry: &Registry, id: ProjectId) -> Vec<String> {
    let Some(pattern) = registry.spec(id).subjects_glob else {
        return Vec::new();
    };

    let source_dir = registry.source_dir(id);
    if !source_dir.is_dir() {
        return Vec::new();
    }

    let full = source_dir.join(pattern);
    let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
        return Vec::new();
    };

    let subjects: BTreeSet<String> = paths
        .filter_map(|p| p.ok())
        .filter(|p| p.is_file())
        .filter_map(|p| subject_stem(&p))
        .collect();

    subjects.into_iter().collect()
}

/// `sub-01.nii.gz` -> `sub-01`
fn subject_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next().unwrap_or(name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
