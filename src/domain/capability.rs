//! Capability findings for a project.
//!
//! A report is a snapshot of the environment taken right before a project is
//! considered for execution. Missing capabilities are findings, not errors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::ProjectId;

/// A precondition for real execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The project's source files exist
    Source,

    /// Every required external tool resolves
    Tool,

    /// Every declared data path exists
    Data,
}

/// Result of probing one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub project: ProjectId,

    pub source_present: bool,

    pub tool_present: bool,

    pub data_present: bool,

    /// Tool name -> resolved executable, for tools that were found
    #[serde(default)]
    pub resolved_tools: BTreeMap<String, PathBuf>,

    /// Free-text findings (which file or tool was missing)
    #[serde(default)]
    pub notes: Vec<String>,

    pub probed_at: DateTime<Utc>,
}

impl CapabilityReport {
    /// Report with every capability satisfied and no notes
    pub fn satisfied(project: ProjectId) -> Self {
        Self::from_flags(project, true, true, true)
    }

    /// Report from raw flags
    pub fn from_flags(project: ProjectId, source: bool, tool: bool, data: bool) -> Self {
        Self {
            project,
            source_present: source,
            tool_present: tool,
            data_present: data,
            resolved_tools: BTreeMap::new(),
            notes: Vec::new(),
            probed_at: Utc::now(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Source => self.source_present,
            Capability::Tool => self.tool_present,
            Capability::Data => self.data_present,
        }
    }

    /// Capabilities that are not satisfied
    pub fn missing(&self) -> Vec<Capability> {
        [Capability::Source, Capability::Tool, Capability::Data]
            .into_iter()
            .filter(|c| !self.has(*c))
            .collect()
    }

    pub fn all_present(&self) -> bool {
        self.source_present && self.tool_present && self.data_present
    }
}
