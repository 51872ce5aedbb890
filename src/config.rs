//! Configuration for adrunner.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI via [`Overrides`])
//! 2. Environment variables (ADRUNNER_WORKSPACE, ADRUNNER_OUTPUT, ADRUNNER_PYTHON)
//! 3. Config file (.adrunner/config.yaml, then the user config directory)
//! 4. Defaults (current directory, ./wrapper_outputs)
//!
//! Config file discovery:
//! - Searches current directory and parents for .adrunner/config.yaml
//! - Falls back to <config_dir>/adrunner/config.yaml
//! - Paths in a project config file are relative to the directory holding .adrunner/

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::limits::ExecutionLimits;
use crate::core::registry::ToolPaths;

pub const ENV_WORKSPACE: &str = "ADRUNNER_WORKSPACE";
pub const ENV_OUTPUT: &str = "ADRUNNER_OUTPUT";
pub const ENV_PYTHON: &str = "ADRUNNER_PYTHON";

/// Default output base, relative to the current directory
pub const DEFAULT_OUTPUT: &str = "wrapper_outputs";

const CONFIG_DIR: &str = ".adrunner";
const CONFIG_NAME: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one subdirectory per project
    pub workspace: Option<String>,
    /// Output base for run directories
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsConfig {
    pub python: Option<String>,
    pub rscript: Option<String>,
    pub nbconvert: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub timeout_seconds: Option<u64>,
    pub max_capture_bytes: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub workspace: PathBuf,
    pub output: PathBuf,
    pub tools: ToolPaths,
    pub limits: ExecutionLimits,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workspace: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub python: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl ResolvedConfig {
    /// Apply command-line values on top of the loaded configuration
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(ref workspace) = overrides.workspace {
            self.workspace = workspace.clone();
        }
        if let Some(ref output) = overrides.output {
            self.output = output.clone();
        }
        if let Some(ref python) = overrides.python {
            self.tools.python = python.clone();
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.limits.timeout_seconds = timeout;
        }
        self
    }
}

/// Find a project config file by searching `start` and its parents
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

fn user_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("adrunner").join(CONFIG_NAME);
    path.exists().then_some(path)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed config file (with the directory its relative paths are
/// resolved against), environment lookups and defaults
fn resolve(
    cwd: &Path,
    file: Option<(PathBuf, PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let (config_file, base_dir, config) = match file {
        Some((path, base, config)) => (Some(path), base, config),
        None => (None, cwd.to_path_buf(), ConfigFile::default()),
    };

    let workspace = env(ENV_WORKSPACE)
        .map(PathBuf::from)
        .or_else(|| config.paths.workspace.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| cwd.to_path_buf());

    let output = env(ENV_OUTPUT)
        .map(PathBuf::from)
        .or_else(|| config.paths.output.as_deref().map(|p| resolve_path(&base_dir, p)))
        .unwrap_or_else(|| cwd.join(DEFAULT_OUTPUT));

    let defaults = ToolPaths::default();
    let tools = ToolPaths {
        python: env(ENV_PYTHON)
            .or(config.tools.python)
            .unwrap_or(defaults.python),
        rscript: config.tools.rscript.unwrap_or(defaults.rscript),
        nbconvert: config.tools.nbconvert.unwrap_or(defaults.nbconvert),
    };

    let default_limits = ExecutionLimits::default();
    let limits = ExecutionLimits {
        timeout_seconds: config
            .limits
            .timeout_seconds
            .unwrap_or(default_limits.timeout_seconds),
        max_capture_bytes: config
            .limits
            .max_capture_bytes
            .unwrap_or(default_limits.max_capture_bytes),
    };

    ResolvedConfig {
        workspace,
        output,
        tools,
        limits,
        config_file,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    let file = if let Some(path) = find_config_file_from(&cwd) {
        let config = load_config_file(&path)?;
        // Base directory is the parent of .adrunner/ (i.e., grandparent of config.yaml)
        let base = path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(&cwd)
            .to_path_buf();
        Some((path, base, config))
    } else if let Some(path) = user_config_file() {
        let config = load_config_file(&path)?;
        Some((path, cwd.clone(), config))
    } else {
        None
    };

    Ok(resolve(&cwd, file, |key| std::env::var(key).ok()))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let cwd = PathBuf::from("/work");
        let config = resolve(&cwd, None, no_env);

        assert_eq!(config.workspace, cwd);
        assert_eq!(config.output, cwd.join("wrapper_outputs"));
        assert_eq!(config.tools, ToolPaths::default());
        assert_eq!(config.limits, ExecutionLimits::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".adrunner");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(
            &path,
            r#"
version: "1"
paths:
  workspace: ./projects
  output: /srv/outputs
tools:
  python: python3.11
limits:
  timeout_seconds: 30
"#,
        )
        .unwrap();

        let file = load_config_file(&path).unwrap();
        assert_eq!(file.paths.workspace.as_deref(), Some("./projects"));
        assert_eq!(file.tools.python.as_deref(), Some("python3.11"));
        assert_eq!(file.tools.rscript, None);
        assert_eq!(file.limits.timeout_seconds, Some(30));

        let config = resolve(
            Path::new("/elsewhere"),
            Some((path.clone(), temp.path().to_path_buf(), file)),
            no_env,
        );
        assert_eq!(config.workspace, temp.path().join("./projects"));
        assert_eq!(config.output, PathBuf::from("/srv/outputs"));
        assert_eq!(config.tools.python, "python3.11");
        assert_eq!(config.tools.rscript, "Rscript");
        assert_eq!(config.limits.timeout_seconds, 30);
        assert_eq!(config.limits.max_capture_bytes, 1024 * 1024);
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_env_beats_file_and_flags_beat_env() {
        let file = ConfigFile {
            paths: PathsConfig {
                workspace: Some("/from/file".to_string()),
                output: None,
            },
            tools: ToolsConfig {
                python: Some("file-python".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let env: HashMap<&str, &str> = [(ENV_WORKSPACE, "/from/env"), (ENV_PYTHON, "env-python")]
            .into_iter()
            .collect();

        let config = resolve(
            Path::new("/cwd"),
            Some((PathBuf::from("/cfg.yaml"), PathBuf::from("/"), file)),
            |k| env.get(k).map(|v| v.to_string()),
        );
        assert_eq!(config.workspace, PathBuf::from("/from/env"));
        assert_eq!(config.tools.python, "env-python");

        let config = config.with_overrides(&Overrides {
            python: Some("flag-python".to_string()),
            timeout_seconds: Some(5),
            ..Default::default()
        });
        assert_eq!(config.tools.python, "flag-python");
        assert_eq!(config.limits.timeout_seconds, 5);
        assert_eq!(config.workspace, PathBuf::from("/from/env"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".adrunner");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "{}").unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file_from(&nested),
            Some(dir.join("config.yaml"))
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
