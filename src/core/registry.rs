//! The project registry.
//!
//! One declarative table describes every project: what must exist before it
//! may run for real, the allow-listed conservative invocations, the folders
//! worth collecting afterwards, and the simulation generator that stands in
//! when prerequisites are unmet. Adding a project is an edit to `PROJECTS`.
//!
//! Real invocations can only be built from the templates in this table, so
//! nothing outside the allow-list ever reaches the execution engine.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{CapabilityReport, ProjectId, UnknownProjectError};
use crate::simulation::{self, SimulationFn};

use self::Arg::Lit;

/// External tools a project may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Python,
    Rscript,
    Nbconvert,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Python => "python",
            Tool::Rscript => "rscript",
            Tool::Nbconvert => "nbconvert",
        }
    }
}

/// Executables used for each tool kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_rscript")]
    pub rscript: String,

    #[serde(default = "default_nbconvert")]
    pub nbconvert: String,
}

fn default_python() -> String {
    "python3".to_string()
}
fn default_rscript() -> String {
    "Rscript".to_string()
}
fn default_nbconvert() -> String {
    "jupyter-nbconvert".to_string()
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            python: default_python(),
            rscript: default_rscript(),
            nbconvert: default_nbconvert(),
        }
    }
}

impl ToolPaths {
    pub fn executable(&self, tool: Tool) -> &str {
        match tool {
            Tool::Python => &self.python,
            Tool::Rscript => &self.rscript,
            Tool::Nbconvert => &self.nbconvert,
        }
    }
}

/// One element of an argument template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Lit(&'static str),
    /// The project's output subdirectory for this run
    OutputDir,
    /// The project's source directory
    SourceDir,
}

/// An allow-listed invocation
#[derive(Debug, Clone, Copy)]
pub struct CommandTemplate {
    pub tool: Tool,
    pub args: &'static [Arg],
}

/// Preconditions for real execution; paths are relative to the source dir
#[derive(Debug, Clone, Copy)]
pub struct Requirements {
    pub source: &'static [&'static str],
    pub tools: &'static [Tool],
    pub data: &'static [&'static str],
}

/// A registry entry
#[derive(Clone, Copy)]
pub struct ProjectSpec {
    pub id: ProjectId,

    pub description: &'static str,

    pub requires: Requirements,

    /// Conservative invocations, run in order. Empty when nothing about the
    /// project is safe to run.
    pub commands: &'static [CommandTemplate],

    /// Folders copied into the run directory after a real run
    pub collect: &'static [&'static str],

    /// Glob (relative to the source dir) whose file stems name subjects
    pub subjects_glob: Option<&'static str>,

    pub simulate: Option<SimulationFn>,
}

impl fmt::Debug for ProjectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSpec")
            .field("id", &self.id)
            .field("requires", &self.requires)
            .field("commands", &self.commands)
            .field("collect", &self.collect)
            .field("simulated", &self.simulate.is_some())
            .finish()
    }
}

impl ProjectSpec {
    pub fn has_real_command(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn supports_simulation(&self) -> bool {
        self.simulate.is_some()
    }
}

static PROJECTS: [ProjectSpec; 5] = [
    ProjectSpec {
        id: ProjectId::AdBiomarkers,
        description: "Proteomics biomarker discovery notebooks (ModelsPipeline.ipynb)",
        requires: Requirements {
            source: &["ModelsPipeline.ipynb"],
            tools: &[Tool::Nbconvert],
            data: &[],
        },
        commands: &[CommandTemplate {
            tool: Tool::Nbconvert,
            args: &[
                Lit("--execute"),
                Lit("--to"),
                Lit("html"),
                Lit("ModelsPipeline.ipynb"),
                Lit("--output-dir"),
                Arg::OutputDir,
            ],
        }],
        collect: &["figures"],
        subjects_glob: Some("Proteomics/*.csv"),
        simulate: Some(simulation::simulate_proteomics),
    },
    ProjectSpec {
        id: ProjectId::Adni,
        description: "ADNI amyloid positivity and staging R scripts",
        requires: Requirements {
            source: &["R/amyloid_pos.R", "R/stage1.R"],
            tools: &[Tool::Rscript],
            data: &[],
        },
        commands: &[
            CommandTemplate {
                tool: Tool::Rscript,
                args: &[Lit("R/amyloid_pos.R")],
            },
            CommandTemplate {
                tool: Tool::Rscript,
                args: &[Lit("R/stage1.R")],
            },
        ],
        collect: &["processed_data", "figures"],
        subjects_glob: Some("CNN/**/*.nii*"),
        simulate: Some(simulation::simulate_adni),
    },
    ProjectSpec {
        id: ProjectId::Lead,
        description: "LEAD EEG classifier, evaluated in test mode (is_training 0)",
        requires: Requirements {
            source: &["run.py"],
            tools: &[Tool::Python],
            data: &["dataset"],
        },
        commands: &[CommandTemplate {
            tool: Tool::Python,
            args: &[
                Lit("run.py"),
                Lit("--method"),
                Lit("LEAD"),
                Lit("--task_name"),
                Lit("supervised"),
                Lit("--model"),
                Lit("LEAD"),
                Lit("--model_id"),
                Lit("quick-test"),
                Lit("--is_training"),
                Lit("0"),
                Lit("--root_path"),
                Lit("dataset"),
            ],
        }],
        collect: &["checkpoints", "results", "figs"],
        subjects_glob: Some("dataset/Feature/*.npy"),
        simulate: Some(simulation::simulate_eeg),
    },
    ProjectSpec {
        id: ProjectId::Tadpole,
        description: "TADPOLE D1/D2 dataset builder",
        requires: Requirements {
            source: &["TADPOLE_D1_D2.py"],
            tools: &[Tool::Python],
            data: &[],
        },
        commands: &[CommandTemplate {
            tool: Tool::Python,
            args: &[
                Lit("TADPOLE_D1_D2.py"),
                Lit("--spreadsheetFolder"),
                Arg::SourceDir,
            ],
        }],
        collect: &["evaluation"],
        subjects_glob: Some("TADPOLE_raw/*.csv"),
        simulate: Some(simulation::simulate_tadpole),
    },
    ProjectSpec {
        id: ProjectId::TransMfAd,
        description: "TransMF MRI+PET fusion transformer (training only, always simulated)",
        requires: Requirements {
            source: &["kfold_train_adversarial.py"],
            tools: &[Tool::Python],
            data: &["MRI"],
        },
        commands: &[],
        collect: &["checkpoints"],
        subjects_glob: Some("MRI/*.nii*"),
        simulate: Some(simulation::simulate_mri_pet),
    },
];

/// A concrete invocation ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// The registry bound to a workspace and tool configuration
#[derive(Debug, Clone)]
pub struct Registry {
    /// Directory containing one subdirectory per project
    workspace: PathBuf,

    tools: ToolPaths,
}

impl Registry {
    pub fn new(workspace: impl Into<PathBuf>, tools: ToolPaths) -> Self {
        Self {
            workspace: workspace.into(),
            tools,
        }
    }

    /// All registered projects, in table order
    pub fn ids(&self) -> Vec<ProjectId> {
        PROJECTS.iter().map(|p| p.id).collect()
    }

    pub fn specs(&self) -> &'static [ProjectSpec] {
        &PROJECTS
    }

    pub fn spec(&self, id: ProjectId) -> &'static ProjectSpec {
        // Every ProjectId variant has exactly one table row
        PROJECTS
            .iter()
            .find(|p| p.id == id)
            .unwrap_or_else(|| unreachable!("project {id} missing from registry"))
    }

    /// Resolve a user-supplied identifier
    pub fn lookup(&self, name: &str) -> Result<&'static ProjectSpec, UnknownProjectError> {
        let id: ProjectId = name.parse()?;
        Ok(self.spec(id))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn source_dir(&self, id: ProjectId) -> PathBuf {
        self.workspace.join(id.as_str())
    }

    /// Build the allow-listed invocations for a project. Tools resolved by
    /// the probe are used by absolute path.
    pub fn invocations(
        &self,
        id: ProjectId,
        output_dir: &Path,
        report: &CapabilityReport,
    ) -> Vec<Invocation> {
        let source_dir = self.source_dir(id);

        self.spec(id)
            .commands
            .iter()
            .map(|template| {
                let program = report
                    .resolved_tools
                    .get(template.tool.name())
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(self.tools.executable(template.tool)));

                let args = template
                    .args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Lit(s) => s.to_string(),
                        Arg::OutputDir => output_dir.display().to_string(),
                        Arg::SourceDir => source_dir.display().to_string(),
                    })
                    .collect();

                Invocation { program, args }
            })
            .collect()
    }
}
