//! Scaffolding for a fresh ralph workspace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::config::{CONFIG_FILE_NAME, RalphConfig, WorkspacePaths, write_config};

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing files.
    pub force: bool,
}

/// Files created (or overwritten) by `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitReport {
    pub paths: WorkspacePaths,
    pub config_path: PathBuf,
    pub written: Vec<PathBuf>,
}

/// Write `ralph.toml`, a starter task list and an empty progress log into
/// `root`. Existing files are left alone unless `options.force` is set.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<InitReport> {
    let config = RalphConfig::default();
    let paths = WorkspacePaths::new(root, &config);
    let config_path = root.join(CONFIG_FILE_NAME);
    let mut written = Vec::new();

    if options.force || !config_path.exists() {
        write_config(&config_path, &config)?;
        written.push(config_path.clone());
    }
    if write_if_missing_or_force(&paths.prd_path, PRD_PLACEHOLDER, options.force)? {
        written.push(paths.prd_path.clone());
    }
    if write_if_missing_or_force(&paths.progress_path, "", options.force)? {
        written.push(paths.progress_path.clone());
    }
    debug!(root = %root.display(), written = written.len(), "initialized workspace");

    Ok(InitReport {
        paths,
        config_path,
        written,
    })
}

fn write_if_missing_or_force(path: &Path, contents: &str, force: bool) -> Result<bool> {
    if !force && path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))?;
    Ok(true)
}

const PRD_PLACEHOLDER: &str = "# PRD\n\nDescribe the project here, then list one task per line.\n\n- [ ] Replace this task with the first real task\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::io::task_file::load_tasks;

    #[test]
    fn init_creates_expected_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");

        assert_eq!(report.written.len(), 3);
        assert_eq!(
            load_config(&report.config_path).expect("config"),
            RalphConfig::default()
        );
        let tasks = load_tasks(&report.paths.prd_path).expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            fs::read_to_string(&report.paths.progress_path).expect("progress"),
            ""
        );
    }

    #[test]
    fn init_keeps_existing_files_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let prd = temp.path().join("PRD.md");
        fs::write(&prd, "- [ ] mine\n").expect("write");

        let report = init_workspace(temp.path(), &InitOptions { force: false }).expect("init");
        assert_eq!(report.written.len(), 2);
        assert_eq!(fs::read_to_string(&prd).expect("read"), "- [ ] mine\n");

        let report = init_workspace(temp.path(), &InitOptions { force: true }).expect("init");
        assert_eq!(report.written.len(), 3);
        assert_eq!(fs::read_to_string(&prd).expect("read"), PRD_PLACEHOLDER);
    }
}
