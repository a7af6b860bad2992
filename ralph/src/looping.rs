//! The ralph loop: pick a task, dispatch it, review, repeat.
//!
//! Each iteration re-reads the task list, selects the next actionable task,
//! hands its prompt to an [`Agent`] under the inactivity watchdog, then runs
//! the review countdown before moving on. Timer callbacks never touch loop
//! state directly; they post [`LoopSignal`]s that the controller consumes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::selector::next_actionable_task;
use crate::core::task::{Task, TaskCompletion};
use crate::io::agent::{ActivityReporter, Agent, AgentRequest};
use crate::io::config::{RalphConfig, WorkspacePaths};
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::task_file::load_tasks;
use crate::timers::{CountdownTimer, InactivityMonitor};

/// Whether a loop run is in progress. `Idle` is both initial and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExecutionState {
    Idle,
    Running,
}

/// Reason why [`LoopController::run`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// No actionable task remains.
    Complete,
    /// `settings.max_iterations` dispatches happened.
    MaxIterationsReached { max_iterations: u32 },
    /// The agent reported no activity for the inactivity timeout.
    Stalled {
        task_description: String,
        idle_for: Duration,
    },
    /// [`LoopHandle::stop`] was called.
    Cancelled,
}

/// Summary of a loop run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Number of dispatches started.
    pub iterations: u32,
    pub completions: Vec<TaskCompletion>,
    pub stop: LoopStop,
}

/// Progress notifications delivered to the `run` callback.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    TaskStarted { iteration: u32, task: &'a Task },
    ReviewTick { remaining: u32 },
    TaskCompleted(&'a TaskCompletion),
}

#[derive(Debug)]
enum LoopSignal {
    Stop,
    CountdownTick(u32),
    InactivityTimeout,
}

/// Cloneable handle for observing and stopping a loop from elsewhere.
#[derive(Clone)]
pub struct LoopHandle {
    signals: mpsc::UnboundedSender<LoopSignal>,
    state: watch::Receiver<LoopExecutionState>,
}

impl LoopHandle {
    /// Request a manual stop. The in-flight dispatch is dropped.
    pub fn stop(&self) {
        let _ = self.signals.send(LoopSignal::Stop);
    }

    pub fn state(&self) -> LoopExecutionState {
        *self.state.borrow()
    }
}

/// Drives the loop over one workspace with one agent.
pub struct LoopController<A> {
    paths: WorkspacePaths,
    config: RalphConfig,
    prompts: PromptBuilder,
    agent: A,
    countdown: CountdownTimer,
    monitor: InactivityMonitor,
    state: Arc<watch::Sender<LoopExecutionState>>,
    signals_tx: mpsc::UnboundedSender<LoopSignal>,
    signals_rx: mpsc::UnboundedReceiver<LoopSignal>,
}

impl<A: Agent> LoopController<A> {
    pub fn new(root: impl Into<PathBuf>, config: RalphConfig, agent: A) -> Result<Self> {
        config.validate()?;
        let paths = WorkspacePaths::new(root, &config);
        let prompts = PromptBuilder::new(&config)?;
        let (state, _) = watch::channel(LoopExecutionState::Idle);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Ok(Self {
            countdown: config.timing.countdown(),
            monitor: config.timing.inactivity_monitor(),
            paths,
            config,
            prompts,
            agent,
            state: Arc::new(state),
            signals_tx,
            signals_rx,
        })
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            signals: self.signals_tx.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> LoopExecutionState {
        *self.state.borrow()
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn countdown(&self) -> &CountdownTimer {
        &self.countdown
    }

    pub fn monitor(&self) -> &InactivityMonitor {
        &self.monitor
    }

    /// Run until no actionable task remains, the iteration limit is hit, the
    /// agent stalls, or the loop is stopped through a [`LoopHandle`].
    ///
    /// Agent and file errors are returned as `Err`. Both timers are stopped
    /// and the state is back to `Idle` however this returns, including when
    /// the future is dropped.
    pub async fn run<F>(&mut self, mut on_event: F) -> Result<LoopOutcome>
    where
        F: FnMut(&LoopEvent<'_>),
    {
        // `&mut self` rules out overlapping runs; a run future leaked without
        // being dropped (e.g. `mem::forget`) never releases its guard.
        if self.state() == LoopExecutionState::Running {
            bail!("loop is already running");
        }
        while self.signals_rx.try_recv().is_ok() {}
        self.state.send_replace(LoopExecutionState::Running);
        let _guard = RunGuard {
            countdown: self.countdown.clone(),
            monitor: self.monitor.clone(),
            state: Arc::clone(&self.state),
        };

        info!(prd = %self.paths.prd_path.display(), "loop started");
        let outcome = self.drive(&mut on_event).await?;
        info!(
            iterations = outcome.iterations,
            completions = outcome.completions.len(),
            stop = ?outcome.stop,
            "loop finished"
        );
        Ok(outcome)
    }

    async fn drive<F>(&mut self, on_event: &mut F) -> Result<LoopOutcome>
    where
        F: FnMut(&LoopEvent<'_>),
    {
        let policy = self.config.settings.selection_policy();
        let max_iterations = self.config.settings.max_iterations;
        let review_secs = self.config.timing.review_countdown_secs;
        let mut completions = Vec::new();
        let mut iteration = 0u32;
        let mut last_dispatched: Option<(usize, String)> = None;

        loop {
            let tasks = load_tasks(&self.paths.prd_path)?;
            let Some(task) = next_actionable_task(&tasks, policy).cloned() else {
                return Ok(finish(iteration, completions, LoopStop::Complete));
            };
            if max_iterations != 0 && iteration >= max_iterations {
                return Ok(finish(
                    iteration,
                    completions,
                    LoopStop::MaxIterationsReached { max_iterations },
                ));
            }
            if last_dispatched.as_ref() == Some(&(task.line_number, task.description.clone())) {
                warn!(task_id = %task.id, line = task.line_number, "task still open after review; dispatching again");
            }

            iteration += 1;
            info!(iteration, task_id = %task.id, line = task.line_number, "dispatching task");
            on_event(&LoopEvent::TaskStarted {
                iteration,
                task: &task,
            });

            let inputs = PromptInputs::load(&self.paths, task.clone())?;
            let request = AgentRequest {
                workdir: self.paths.root.clone(),
                prompt: self.prompts.build_task_prompt(&inputs)?,
                task: Some(task.clone()),
                iteration,
                log_path: Some(self.paths.log_dir.join(format!("iteration-{iteration}.log"))),
            };
            let started = Instant::now();

            if self.monitor.is_active() {
                self.monitor.resume();
            } else {
                let signals = self.signals_tx.clone();
                self.monitor.start(move || {
                    let _ = signals.send(LoopSignal::InactivityTimeout);
                });
            }
            self.monitor.set_waiting(false);
            let reporter = ActivityReporter::new(self.monitor.clone());

            {
                let dispatch = self.agent.dispatch(&request, &reporter);
                tokio::pin!(dispatch);
                loop {
                    tokio::select! {
                        biased;
                        signal = self.signals_rx.recv() => match signal {
                            Some(LoopSignal::Stop) => {
                                info!(iteration, "loop stopped during dispatch");
                                return Ok(finish(iteration, completions, LoopStop::Cancelled));
                            }
                            Some(LoopSignal::InactivityTimeout) => {
                                let idle_for = self.monitor.idle_for().unwrap_or_default();
                                warn!(iteration, task_id = %task.id, idle_ms = idle_for.as_millis() as u64, "agent stalled");
                                return Ok(finish(
                                    iteration,
                                    completions,
                                    LoopStop::Stalled {
                                        task_description: task.description.clone(),
                                        idle_for,
                                    },
                                ));
                            }
                            Some(LoopSignal::CountdownTick(_)) => {}
                            None => bail!("loop signal channel closed"),
                        },
                        result = &mut dispatch => {
                            result.with_context(|| format!("dispatch {} (iteration {iteration})", task.id))?;
                            break;
                        }
                    }
                }
            }

            self.monitor.set_waiting(true);
            self.monitor.pause();
            debug!(iteration, seconds = review_secs, "review countdown started");
            let signals = self.signals_tx.clone();
            self.countdown.start(review_secs, move |remaining| {
                let _ = signals.send(LoopSignal::CountdownTick(remaining));
            });
            loop {
                match self.signals_rx.recv().await {
                    Some(LoopSignal::CountdownTick(remaining)) => {
                        on_event(&LoopEvent::ReviewTick { remaining });
                        if remaining == 0 {
                            break;
                        }
                    }
                    Some(LoopSignal::Stop) => {
                        info!(iteration, "loop stopped during review");
                        return Ok(finish(iteration, completions, LoopStop::Cancelled));
                    }
                    // The monitor is paused; a timeout queued before the pause is stale.
                    Some(LoopSignal::InactivityTimeout) => {}
                    None => bail!("loop signal channel closed"),
                }
            }

            let completion = TaskCompletion {
                task_description: task.description.clone(),
                completed_at: Utc::now(),
                duration: started.elapsed(),
                iteration,
            };
            on_event(&LoopEvent::TaskCompleted(&completion));
            completions.push(completion);
            last_dispatched = Some((task.line_number, task.description));
        }
    }
}

fn finish(iterations: u32, completions: Vec<TaskCompletion>, stop: LoopStop) -> LoopOutcome {
    LoopOutcome {
        iterations,
        completions,
        stop,
    }
}

/// Stops both timers and publishes `Idle` when a run ends.
struct RunGuard {
    countdown: CountdownTimer,
    monitor: InactivityMonitor,
    state: Arc<watch::Sender<LoopExecutionState>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.countdown.stop();
        self.monitor.stop();
        self.state.send_replace(LoopExecutionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, ScriptedDispatch, TestWorkspace};
    use std::fs;

    fn config(max_iterations: u32) -> RalphConfig {
        let mut config = RalphConfig::default();
        config.settings.max_iterations = max_iterations;
        config
    }

    fn new_controller(
        workspace: &TestWorkspace,
        config: RalphConfig,
        script: Vec<ScriptedDispatch>,
    ) -> LoopController<ScriptedAgent> {
        let agent = ScriptedAgent::new(workspace.prd_path(), script);
        LoopController::new(workspace.root(), config, agent).expect("controller")
    }

    fn describe(event: &LoopEvent<'_>) -> String {
        match event {
            LoopEvent::TaskStarted { iteration, task } => {
                format!("start {iteration} {}", task.description)
            }
            LoopEvent::ReviewTick { remaining } => format!("tick {remaining}"),
            LoopEvent::TaskCompleted(completion) => {
                format!("done {}", completion.task_description)
            }
        }
    }

    fn completed(outcome: &LoopOutcome) -> Vec<&str> {
        outcome
            .completions
            .iter()
            .map(|completion| completion.task_description.as_str())
            .collect()
    }

    fn assert_idle<A: Agent>(controller: &LoopController<A>) {
        assert_eq!(controller.state(), LoopExecutionState::Idle);
        assert!(!controller.countdown().is_active());
        assert!(!controller.monitor().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_every_task_is_checked_off() {
        let workspace = TestWorkspace::new("# PRD\n- [x] done\n- [ ] first\n- [ ] second\n")
            .expect("workspace");
        let mut controller = new_controller(&workspace, config(50), Vec::new());
        let handle = controller.handle();
        assert_eq!(handle.state(), LoopExecutionState::Idle);

        let mut events = Vec::new();
        let mut states = Vec::new();
        let outcome = controller
            .run(|event| {
                if matches!(event, LoopEvent::TaskStarted { .. }) {
                    states.push(handle.state());
                }
                events.push(describe(event));
            })
            .await
            .expect("run");

        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(completed(&outcome), vec!["first", "second"]);
        assert_eq!(outcome.completions[0].iteration, 1);
        assert_eq!(outcome.completions[1].iteration, 2);
        assert!(outcome.completions[0].duration >= Duration::from_secs(12));
        assert_eq!(states, vec![LoopExecutionState::Running; 2]);

        assert_eq!(events[0], "start 1 first");
        assert_eq!(events[1], "tick 12");
        assert_eq!(events[13], "tick 0");
        assert_eq!(events[14], "done first");
        assert_eq!(events[15], "start 2 second");
        assert_eq!(events.len(), 30);

        let prompts = controller.agent().prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Implement the task: first"));
        assert!(prompts[1].contains("Implement the task: second"));
        assert_eq!(
            workspace.read_prd().expect("prd"),
            "# PRD\n- [x] done\n- [x] first\n- [x] second\n"
        );
        assert_idle(&controller);
        assert_eq!(handle.state(), LoopExecutionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_iterations_when_task_stays_open() {
        let workspace = TestWorkspace::new("- [ ] stuck task\n").expect("workspace");
        let script = vec![ScriptedDispatch::LeaveOpen; 5];
        let mut controller = new_controller(&workspace, config(3), script);

        let outcome = controller.run(|_| {}).await.expect("run");

        assert_eq!(
            outcome.stop,
            LoopStop::MaxIterationsReached { max_iterations: 3 }
        );
        assert_eq!(outcome.iterations, 3);
        assert_eq!(completed(&outcome), vec!["stuck task"; 3]);
        assert_eq!(controller.agent().requests().len(), 3);
        assert_eq!(workspace.read_prd().expect("prd"), "- [ ] stuck task\n");
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_iterations_means_unlimited() {
        let workspace = TestWorkspace::new("- [ ] a\n- [ ] b\n- [ ] c\n").expect("workspace");
        let script = vec![ScriptedDispatch::LeaveOpen; 4];
        let mut controller = new_controller(&workspace, config(0), script);

        let outcome = controller.run(|_| {}).await.expect("run");

        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(outcome.iterations, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_agent_stops_the_loop_as_stalled() {
        let workspace = TestWorkspace::new("- [ ] slow\n- [ ] later\n").expect("workspace");
        let mut controller = new_controller(&workspace, config(50), vec![ScriptedDispatch::Hang]);

        let outcome = controller.run(|_| {}).await.expect("run");

        match &outcome.stop {
            LoopStop::Stalled {
                task_description,
                idle_for,
            } => {
                assert_eq!(task_description, "slow");
                assert!(*idle_for >= Duration::from_secs(60));
            }
            other => panic!("expected stalled, got {other:?}"),
        }
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.completions.is_empty());
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_activity_keeps_a_slow_agent_alive() {
        let workspace = TestWorkspace::new("- [ ] slow but busy\n").expect("workspace");
        let script = vec![ScriptedDispatch::Complete {
            activity: 4,
            every: Duration::from_secs(50),
        }];
        let mut controller = new_controller(&workspace, config(50), script);

        let outcome = controller.run(|_| {}).await.expect("run");

        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(completed(&outcome), vec!["slow but busy"]);
        assert!(outcome.completions[0].duration >= Duration::from_secs(212));
    }

    #[tokio::test(start_paused = true)]
    async fn review_countdown_does_not_count_as_inactivity() {
        let workspace = TestWorkspace::new("- [ ] a\n- [ ] b\n").expect("workspace");
        let mut config = config(50);
        config.timing.review_countdown_secs = 90;
        let mut controller = new_controller(&workspace, config, Vec::new());

        let outcome = controller.run(|_| {}).await.expect("run");

        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(completed(&outcome), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_review_cancels_and_next_run_starts_clean() {
        let workspace = TestWorkspace::new("- [ ] one\n- [ ] two\n").expect("workspace");
        let mut controller = new_controller(&workspace, config(50), Vec::new());
        let handle = controller.handle();

        let mut ticks = Vec::new();
        let outcome = controller
            .run(|event| {
                if let LoopEvent::ReviewTick { remaining } = event {
                    ticks.push(*remaining);
                    if *remaining == 10 {
                        handle.stop();
                    }
                }
            })
            .await
            .expect("run");

        assert_eq!(outcome.stop, LoopStop::Cancelled);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.completions.is_empty());
        assert_eq!(ticks, vec![12, 11, 10]);
        assert_idle(&controller);

        // "one" was checked off before the stop; only "two" remains.
        let outcome = controller.run(|_| {}).await.expect("second run");
        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(completed(&outcome), vec!["two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_dispatch_abandons_the_agent() {
        let workspace = TestWorkspace::new("- [ ] forever\n").expect("workspace");
        let mut controller = new_controller(&workspace, config(50), vec![ScriptedDispatch::Hang]);
        let handle = controller.handle();

        let outcome = controller
            .run(|event| {
                if matches!(event, LoopEvent::TaskStarted { .. }) {
                    handle.stop();
                }
            })
            .await
            .expect("run");

        assert_eq!(outcome.stop, LoopStop::Cancelled);
        assert_eq!(outcome.iterations, 1);
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_error_is_returned_and_timers_are_stopped() {
        let workspace = TestWorkspace::new("- [ ] explode\n").expect("workspace");
        let script = vec![ScriptedDispatch::Fail("boom".to_string())];
        let mut controller = new_controller(&workspace, config(50), script);

        let err = controller.run(|_| {}).await.unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("dispatch task-1"));
        assert!(message.contains("boom"));
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_task_list_is_an_error() {
        let workspace = TestWorkspace::new("").expect("workspace");
        fs::remove_file(workspace.prd_path()).expect("remove prd");
        let mut controller = new_controller(&workspace, config(50), Vec::new());

        let err = controller.run(|_| {}).await.unwrap_err();

        assert!(err.to_string().contains("read task list"));
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn task_list_edits_between_iterations_are_picked_up() {
        let workspace = TestWorkspace::new("- [ ] first\n").expect("workspace");
        let prd_path = workspace.prd_path();
        let mut controller = new_controller(&workspace, config(50), Vec::new());

        let outcome = controller
            .run(|event| {
                if let LoopEvent::TaskStarted { iteration: 1, .. } = event {
                    let mut contents = fs::read_to_string(&prd_path).expect("read");
                    contents.push_str("- [ ] added later\n");
                    fs::write(&prd_path, contents).expect("write");
                }
            })
            .await
            .expect("run");

        assert_eq!(completed(&outcome), vec!["first", "added later"]);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_policy_picks_in_progress_tasks() {
        let prd = "- [~] half done\n- [ ] next\n";

        let workspace = TestWorkspace::new(prd).expect("workspace");
        let mut controller = new_controller(&workspace, config(50), Vec::new());
        let outcome = controller.run(|_| {}).await.expect("run");
        assert_eq!(completed(&outcome), vec!["next"]);

        let workspace = TestWorkspace::new(prd).expect("workspace");
        let mut config = config(50);
        config.settings.resume_in_progress = true;
        let mut controller = new_controller(&workspace, config, Vec::new());
        let outcome = controller.run(|_| {}).await.expect("run");
        assert_eq!(completed(&outcome), vec!["half done", "next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_review_countdown_advances_immediately() {
        let workspace = TestWorkspace::new("- [ ] a\n- [ ] b\n").expect("workspace");
        let mut config = config(50);
        config.timing.review_countdown_secs = 0;
        let mut controller = new_controller(&workspace, config, Vec::new());

        let mut events = Vec::new();
        let outcome = controller
            .run(|event| events.push(describe(event)))
            .await
            .expect("run");

        assert_eq!(outcome.stop, LoopStop::Complete);
        assert_eq!(
            events,
            vec!["start 1 a", "tick 0", "done a", "start 2 b", "tick 0", "done b"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn agent_requests_carry_iteration_and_log_path() {
        let workspace = TestWorkspace::new("- [ ] logged\n").expect("workspace");
        let mut controller = new_controller(&workspace, config(50), Vec::new());

        controller.run(|_| {}).await.expect("run");

        let requests = controller.agent().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].iteration, 1);
        assert_eq!(requests[0].workdir, workspace.root());
        assert_eq!(
            requests[0].log_path.as_deref(),
            Some(workspace.root().join(".ralph/logs/iteration-1.log").as_path())
        );
        assert_eq!(
            requests[0].task.as_ref().map(|task| task.id.as_str()),
            Some("task-1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_refuses_to_start_while_a_leaked_run_holds_the_state() {
        let workspace = TestWorkspace::new("- [ ] forever\n").expect("workspace");
        let mut controller = new_controller(&workspace, config(50), vec![ScriptedDispatch::Hang]);

        let mut leaked = Box::pin(controller.run(|_| {}));
        assert!(
            tokio::time::timeout(Duration::ZERO, &mut leaked)
                .await
                .is_err()
        );
        std::mem::forget(leaked);

        assert_eq!(controller.state(), LoopExecutionState::Running);
        let err = controller.run(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("already running"));
    }
}
