//! `ralph` command-line entry point.
//!
//! Commands operate on a workspace directory holding `ralph.toml`, the task
//! list and the progress log. Exit codes are listed in [`ralph::exit_codes`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use ralph::core::selector::next_actionable_task;
use ralph::core::task::{Task, TaskSummary};
use ralph::exit_codes;
use ralph::io::agent::{ActivityReporter, Agent, AgentRequest, CommandAgent};
use ralph::io::config::{CONFIG_FILE_NAME, RalphConfig, WorkspacePaths, load_config};
use ralph::io::init::{InitOptions, init_workspace};
use ralph::io::prompt::{PromptBuilder, PromptInputs};
use ralph::io::task_file::load_tasks;
use ralph::logging;
use ralph::looping::{LoopController, LoopEvent, LoopStop};

#[derive(Parser)]
#[command(name = "ralph", version, about = "Task-list driven agent loop")]
struct Cli {
    /// Workspace root holding the task list.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,
    /// Config file (default: `<workspace>/ralph.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `ralph.toml`, `PRD.md` and `progress.txt` if missing.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// List parsed tasks with a status summary.
    Tasks {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the next actionable task.
    Next,
    /// Print the prompt the agent would receive for the next task.
    Prompt,
    /// Ask the agent to write the task list from a project description.
    Prd {
        /// Project description.
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
        /// Print the prompt instead of dispatching it.
        #[arg(long)]
        print: bool,
    },
    /// Work through the task list until it is complete.
    Run {
        /// Override `settings.max_iterations` (0 = unlimited).
        #[arg(long)]
        max_iterations: Option<u32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init();
    match run().await {
        Ok(exit_codes::OK) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.workspace, force),
        Command::Tasks { json } => cmd_tasks(&workspace(&cli)?, json),
        Command::Next => cmd_next(&workspace(&cli)?),
        Command::Prompt => cmd_prompt(&workspace(&cli)?),
        Command::Prd {
            ref description,
            print,
        } => cmd_prd(&workspace(&cli)?, &description.join(" "), print).await,
        Command::Run { max_iterations } => {
            let mut workspace = workspace(&cli)?;
            if let Some(max_iterations) = max_iterations {
                workspace.config.settings.max_iterations = max_iterations;
            }
            cmd_run(workspace).await
        }
    }
}

/// Loaded configuration plus resolved paths.
struct Workspace {
    config: RalphConfig,
    paths: WorkspacePaths,
}

fn workspace(cli: &Cli) -> Result<Workspace> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.workspace.join(CONFIG_FILE_NAME));
    let config = load_config(&config_path)?;
    let paths = WorkspacePaths::new(&cli.workspace, &config);
    Ok(Workspace { config, paths })
}

fn cmd_init(root: &std::path::Path, force: bool) -> Result<i32> {
    let report = init_workspace(root, &InitOptions { force })?;
    for path in &report.written {
        println!("wrote {}", path.display());
    }
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
struct TaskListReport<'a> {
    summary: TaskSummary,
    tasks: &'a [Task],
}

fn cmd_tasks(workspace: &Workspace, json: bool) -> Result<i32> {
    let tasks = load_tasks(&workspace.paths.prd_path)?;
    let summary = TaskSummary::from_tasks(&tasks);
    if json {
        let report = TaskListReport {
            summary,
            tasks: &tasks,
        };
        let payload = serde_json::to_string_pretty(&report).context("serialize task list")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }
    for task in &tasks {
        println!(
            "{}\t{}\tline {}\t{}",
            task.id,
            task.status.as_str(),
            task.line_number,
            task.description
        );
    }
    println!(
        "{} tasks: {} pending, {} in progress, {} complete, {} blocked",
        summary.total(),
        summary.pending,
        summary.in_progress,
        summary.complete,
        summary.blocked
    );
    Ok(exit_codes::OK)
}

fn select_next(workspace: &Workspace) -> Result<Option<Task>> {
    let tasks = load_tasks(&workspace.paths.prd_path)?;
    let policy = workspace.config.settings.selection_policy();
    Ok(next_actionable_task(&tasks, policy).cloned())
}

fn cmd_next(workspace: &Workspace) -> Result<i32> {
    let Some(task) = select_next(workspace)? else {
        println!("no actionable task");
        return Ok(exit_codes::COMPLETE);
    };
    println!("{} (line {}): {}", task.id, task.line_number, task.description);
    Ok(exit_codes::OK)
}

fn cmd_prompt(workspace: &Workspace) -> Result<i32> {
    let Some(task) = select_next(workspace)? else {
        println!("no actionable task");
        return Ok(exit_codes::COMPLETE);
    };
    let builder = PromptBuilder::new(&workspace.config)?;
    let prompt = builder.build_task_prompt(&PromptInputs::load(&workspace.paths, task)?)?;
    println!("{prompt}");
    Ok(exit_codes::OK)
}

async fn cmd_prd(workspace: &Workspace, description: &str, print: bool) -> Result<i32> {
    let builder = PromptBuilder::new(&workspace.config)?;
    let prompt = builder.build_prd_generation_prompt(description, &workspace.paths)?;
    if print {
        println!("{prompt}");
        return Ok(exit_codes::OK);
    }

    let agent = CommandAgent::from_config(&workspace.config.agent)?;
    let request = AgentRequest {
        workdir: workspace.paths.root.clone(),
        prompt,
        task: None,
        iteration: 0,
        log_path: Some(workspace.paths.log_dir.join("prd-generation.log")),
    };
    agent
        .dispatch(&request, &ActivityReporter::detached())
        .await
        .context("generate task list")?;

    let tasks = load_tasks(&workspace.paths.prd_path)?;
    println!(
        "{} now lists {} tasks",
        workspace.paths.prd_path.display(),
        tasks.len()
    );
    Ok(exit_codes::OK)
}

async fn cmd_run(workspace: Workspace) -> Result<i32> {
    let agent = CommandAgent::from_config(&workspace.config.agent)?;
    let mut controller = LoopController::new(&workspace.paths.root, workspace.config, agent)?;

    let handle = controller.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let outcome = controller.run(print_event).await?;
    match &outcome.stop {
        LoopStop::Complete => println!("all tasks complete"),
        LoopStop::MaxIterationsReached { max_iterations } => {
            println!("stopped after {max_iterations} iterations");
        }
        LoopStop::Stalled {
            task_description,
            idle_for,
        } => println!(
            "agent inactive for {}s while working on: {task_description}",
            idle_for.as_secs()
        ),
        LoopStop::Cancelled => println!("stopped"),
    }
    println!(
        "{} iterations, {} tasks reviewed",
        outcome.iterations,
        outcome.completions.len()
    );
    Ok(exit_code_for(&outcome.stop))
}

fn print_event(event: &LoopEvent<'_>) {
    match event {
        LoopEvent::TaskStarted { iteration, task } => {
            println!("[{iteration}] {}: {}", task.id, task.description);
        }
        LoopEvent::ReviewTick { remaining } if *remaining > 0 => {
            println!("next task in {remaining}s");
        }
        LoopEvent::ReviewTick { .. } => {}
        LoopEvent::TaskCompleted(completion) => println!(
            "[{}] done in {}s",
            completion.iteration,
            completion.duration.as_secs()
        ),
    }
}

fn exit_code_for(stop: &LoopStop) -> i32 {
    match stop {
        LoopStop::Complete => exit_codes::COMPLETE,
        LoopStop::MaxIterationsReached { .. } => exit_codes::MAX_ITERATIONS,
        LoopStop::Stalled { .. } => exit_codes::STALLED,
        LoopStop::Cancelled => exit_codes::CANCELLED,
    }
}
