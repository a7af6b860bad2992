//! Reading the task list (PRD) and progress log from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::parser::parse_tasks;
use crate::core::task::Task;

/// Read and parse the task list. Always re-reads; nothing is cached.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = read_task_list(path)?;
    let tasks: Vec<Task> = parse_tasks(&contents).collect();
    debug!(path = %path.display(), tasks = tasks.len(), "parsed task list");
    Ok(tasks)
}

/// Read the raw task-list text.
pub fn read_task_list(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read task list {}", path.display()))
}

/// Read the progress log, treating a missing file as empty.
pub fn read_progress(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).with_context(|| format!("read progress log {}", path.display()))
}
