//! Loop configuration stored in `ralph.toml` at the workspace root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::requirements::TaskRequirements;
use crate::core::selector::SelectionPolicy;
use crate::timers::TimingConfig;

pub const CONFIG_FILE_NAME: &str = "ralph.toml";

/// Ralph configuration (TOML).
///
/// Loaded once per run and never mutated afterwards. Missing tables and
/// fields fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    pub files: FilesConfig,
    pub prompt: PromptConfig,
    pub requirements: TaskRequirements,
    pub settings: RalphSettings,
    pub agent: AgentConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// Task list, relative to the workspace root.
    pub prd_path: PathBuf,
    /// Append-only progress log, relative to the workspace root.
    pub progress_path: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            prd_path: PathBuf::from("PRD.md"),
            progress_path: PathBuf::from("progress.txt"),
        }
    }
}

/// Custom prompt templates. Empty means "use the built-in template".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptConfig {
    pub custom_template: String,
    pub custom_prd_generation_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphSettings {
    /// Maximum loop iterations per run; `0` means unlimited.
    pub max_iterations: u32,
    /// Also pick `[~]` tasks so an interrupted task resumes first.
    pub resume_in_progress: bool,
}

impl Default for RalphSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            resume_in_progress: false,
        }
    }
}

impl RalphSettings {
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::from_resume_flag(self.resume_in_progress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv; the prompt is written to its stdin.
    pub command: Vec<String>,
    /// Truncate captured agent output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Per-iteration agent logs, relative to the workspace root.
    pub log_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            output_limit_bytes: 100_000,
            log_dir: PathBuf::from(".ralph").join("logs"),
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.files.prd_path.as_os_str().is_empty() {
            return Err(anyhow!("files.prd_path must not be empty"));
        }
        if self.files.progress_path.as_os_str().is_empty() {
            return Err(anyhow!("files.progress_path must not be empty"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        self.timing.validate()
    }
}

/// Resolved locations of the files the loop reads.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub prd_path: PathBuf,
    pub progress_path: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>, config: &RalphConfig) -> Self {
        let root = root.into();
        Self {
            prd_path: root.join(&config.files.prd_path),
            progress_path: root.join(&config.files.progress_path),
            log_dir: root.join(&config.agent.log_dir),
            root,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
