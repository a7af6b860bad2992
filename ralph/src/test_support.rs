//! Test-only helpers: temporary workspaces and a scripted agent.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::task::Task;
use crate::io::agent::{ActivityReporter, Agent, AgentRequest};
use crate::io::config::{CONFIG_FILE_NAME, RalphConfig, write_config};

/// Temporary workspace holding a `PRD.md`.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new(prd: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp workspace")?;
        let workspace = Self { temp };
        workspace.write_prd(prd)?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn prd_path(&self) -> PathBuf {
        self.root().join("PRD.md")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root().join("progress.txt")
    }

    pub fn read_prd(&self) -> Result<String> {
        fs::read_to_string(self.prd_path()).context("read test PRD")
    }

    pub fn write_prd(&self, contents: &str) -> Result<()> {
        fs::write(self.prd_path(), contents).context("write test PRD")
    }

    pub fn write_progress(&self, contents: &str) -> Result<()> {
        fs::write(self.progress_path(), contents).context("write test progress")
    }

    pub fn write_config(&self, config: &RalphConfig) -> Result<()> {
        write_config(&self.root().join(CONFIG_FILE_NAME), config)
    }
}

/// One scripted reaction to a dispatch.
#[derive(Debug, Clone)]
pub enum ScriptedDispatch {
    /// Report `activity` actions spaced `every` apart, then check the task off.
    Complete { activity: u32, every: Duration },
    /// Return without touching the task list.
    LeaveOpen,
    /// Never return and never report activity.
    Hang,
    /// Return an error.
    Fail(String),
}

impl ScriptedDispatch {
    pub fn complete() -> Self {
        Self::Complete {
            activity: 0,
            every: Duration::ZERO,
        }
    }
}

/// Agent that plays back a queue of scripted dispatches.
///
/// Once the queue is empty every dispatch checks its task off.
pub struct ScriptedAgent {
    prd_path: PathBuf,
    script: Mutex<VecDeque<ScriptedDispatch>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(prd_path: impl Into<PathBuf>, script: impl IntoIterator<Item = ScriptedDispatch>) -> Self {
        Self {
            prd_path: prd_path.into(),
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        lock(&self.requests).clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }
}

impl Agent for ScriptedAgent {
    async fn dispatch(&self, request: &AgentRequest, activity: &ActivityReporter) -> Result<()> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.script)
            .pop_front()
            .unwrap_or_else(ScriptedDispatch::complete);

        match next {
            ScriptedDispatch::Complete {
                activity: actions,
                every,
            } => {
                for _ in 0..actions {
                    tokio::time::sleep(every).await;
                    activity.record();
                }
                let task = request
                    .task
                    .as_ref()
                    .ok_or_else(|| anyhow!("scripted completion needs a task"))?;
                check_off(&self.prd_path, task)
            }
            ScriptedDispatch::LeaveOpen => Ok(()),
            ScriptedDispatch::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            ScriptedDispatch::Fail(message) => Err(anyhow!(message)),
        }
    }
}

/// Rewrite the task's checkbox to `[x]` in the task list.
pub fn check_off(prd_path: &Path, task: &Task) -> Result<()> {
    let contents = fs::read_to_string(prd_path)
        .with_context(|| format!("read {}", prd_path.display()))?;
    let open = task
        .raw_line
        .find('[')
        .ok_or_else(|| anyhow!("task line has no checkbox: {}", task.raw_line))?;
    let checked = format!(
        "{}[x]{}",
        &task.raw_line[..open],
        &task.raw_line[open + 3..]
    );
    let updated = contents.replacen(&task.raw_line, &checked, 1);
    fs::write(prd_path, updated).with_context(|| format!("write {}", prd_path.display()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
