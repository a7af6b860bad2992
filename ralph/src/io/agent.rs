//! Agent abstraction for prompt dispatch.
//!
//! The [`Agent`] trait decouples the loop from the actual agent backend
//! (an external CLI reading the prompt on stdin). Tests use scripted agents
//! that edit the task list directly without spawning processes.

use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::core::task::Task;
use crate::io::config::AgentConfig;
use crate::timers::InactivityMonitor;

/// Parameters for one agent dispatch.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent.
    pub workdir: PathBuf,
    /// Prompt text to feed to the agent.
    pub prompt: String,
    /// Task being worked on; `None` for PRD generation.
    pub task: Option<Task>,
    /// Loop iteration (1-indexed); `0` outside the loop.
    pub iteration: u32,
    /// Where to write captured agent output, if anywhere.
    pub log_path: Option<PathBuf>,
}

/// Forwards observed agent actions to the inactivity monitor.
#[derive(Clone)]
pub struct ActivityReporter {
    monitor: InactivityMonitor,
}

impl ActivityReporter {
    pub fn new(monitor: InactivityMonitor) -> Self {
        Self { monitor }
    }

    /// Reporter backed by a monitor that is never started.
    pub fn detached() -> Self {
        Self::new(InactivityMonitor::default())
    }

    /// The agent did something observable.
    pub fn record(&self) {
        self.monitor.record_activity();
    }

    /// The agent is (or stopped) waiting on something outside its control.
    pub fn waiting(&self, waiting: bool) {
        self.monitor.set_waiting(waiting);
    }
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Hand the prompt to the agent and resolve once it is done with it.
    ///
    /// Dropping the returned future must abandon the dispatch.
    fn dispatch(
        &self,
        request: &AgentRequest,
        activity: &ActivityReporter,
    ) -> impl Future<Output = Result<()>>;
}

/// Agent that spawns a configured command and writes the prompt to its stdin.
///
/// Every line the command prints counts as activity.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandAgent {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent.command must be a non-empty array"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(program = %self.program, iteration = request.iteration))]
    async fn dispatch(&self, request: &AgentRequest, activity: &ActivityReporter) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&request.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn agent {}", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;

        // Feed stdin concurrently so a chatty agent cannot deadlock on full pipes.
        let prompt = request.prompt.clone().into_bytes();
        let writer = tokio::spawn(async move {
            stdin.write_all(&prompt).await?;
            stdin.shutdown().await
        });

        let mut log = PendingLog {
            path: request.log_path.clone(),
            capture: OutputCapture::new(self.output_limit_bytes),
        };
        let mut stdout = BufReader::new(stdout).split(b'\n');
        let mut stderr = BufReader::new(stderr).split(b'\n');
        let mut stdout_done = false;
        let mut stderr_done = false;
        loop {
            tokio::select! {
                segment = stdout.next_segment(), if !stdout_done => {
                    match segment.context("read agent stdout")? {
                        Some(line) => {
                            activity.record();
                            log.capture.stdout.push_line(&line);
                        }
                        None => stdout_done = true,
                    }
                }
                segment = stderr.next_segment(), if !stderr_done => {
                    match segment.context("read agent stderr")? {
                        Some(line) => {
                            activity.record();
                            log.capture.stderr.push_line(&line);
                        }
                        None => stderr_done = true,
                    }
                }
                else => break,
            }
        }

        let status = child.wait().await.context("wait for agent")?;
        log.finish()?;
        let written = writer.await.context("join agent stdin writer")?;

        if !status.success() {
            warn!(exit_code = ?status.code(), "agent failed");
            return Err(anyhow!("agent exited with status {:?}", status.code()));
        }
        match written {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!("agent exited before reading the whole prompt");
            }
            Err(err) => return Err(err).context("write agent stdin"),
        }
        debug!("agent completed successfully");
        Ok(())
    }
}

/// Bounded copy of one output stream.
#[derive(Debug, Default)]
struct CapturedStream {
    bytes: Vec<u8>,
    truncated: usize,
    limit: usize,
}

impl CapturedStream {
    fn push_line(&mut self, line: &[u8]) {
        for chunk in [line, b"\n"] {
            let remaining = self.limit.saturating_sub(self.bytes.len());
            let keep = chunk.len().min(remaining);
            self.bytes.extend_from_slice(&chunk[..keep]);
            self.truncated += chunk.len() - keep;
        }
    }

    fn truncated_notice(&self, label: &str) -> String {
        if self.truncated > 0 {
            format!("\n[agent {label} truncated {} bytes]\n", self.truncated)
        } else {
            String::new()
        }
    }
}

#[derive(Debug)]
struct OutputCapture {
    stdout: CapturedStream,
    stderr: CapturedStream,
}

impl OutputCapture {
    fn new(limit: usize) -> Self {
        Self {
            stdout: CapturedStream {
                limit,
                ..CapturedStream::default()
            },
            stderr: CapturedStream {
                limit,
                ..CapturedStream::default()
            },
        }
    }
}

/// Captured output bound for the agent log.
///
/// Dropping it before `finish` (stall, cancel, read error) still writes what
/// was captured so far, marked as interrupted.
struct PendingLog {
    path: Option<PathBuf>,
    capture: OutputCapture,
}

impl PendingLog {
    fn finish(mut self) -> Result<()> {
        match self.path.take() {
            Some(path) => write_agent_log(&path, &self.capture, false),
            None => Ok(()),
        }
    }
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        if let Err(err) = write_agent_log(&path, &self.capture, true) {
            warn!(path = %path.display(), error = %format!("{err:#}"), "failed to write interrupted agent log");
        }
    }
}

fn write_agent_log(path: &Path, capture: &OutputCapture, interrupted: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&capture.stdout.bytes));
    buf.push_str(&capture.stdout.truncated_notice("stdout"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&capture.stderr.bytes));
    buf.push_str(&capture.stderr.truncated_notice("stderr"));
    if interrupted {
        buf.push_str("\n=== interrupted before the agent exited ===\n");
    }
    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}
