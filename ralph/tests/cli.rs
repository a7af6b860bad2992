//! CLI tests for the `ralph` binary.
//!
//! Spawns the binary against temp workspaces and checks exit codes and
//! output for the commands that do not need an agent.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use ralph::exit_codes;
use ralph::io::init::{InitOptions, init_workspace};

fn ralph(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ralph"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run ralph")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn next_on_finished_list_exits_with_complete_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("PRD.md"), "- [x] one\n- [!] blocked\n").expect("write");

    let output = ralph(temp.path(), &["next"]);

    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    assert!(stdout(&output).contains("no actionable task"));
}

#[test]
fn next_prints_first_pending_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("PRD.md"),
        "# PRD\r\n- [x] one\r\n- [ ] two\r\n",
    )
    .expect("write");

    let output = ralph(temp.path(), &["next"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output).trim(), "task-2 (line 3): two");
}

#[test]
fn workspace_flag_points_at_another_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = temp.path().join("project");
    fs::create_dir_all(&workspace).expect("mkdir");
    fs::write(workspace.join("PRD.md"), "- [ ] elsewhere\n").expect("write");

    let output = ralph(
        temp.path(),
        &["next", "--workspace", workspace.to_str().expect("utf-8 path")],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("elsewhere"));
}

#[test]
fn tasks_json_reports_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("PRD.md"),
        "- [x] done\n- [~] doing\n- [ ] todo\n- [!] stuck\n",
    )
    .expect("write");

    let output = ralph(temp.path(), &["tasks", "--json"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["summary"]["pending"], 1);
    assert_eq!(report["summary"]["in_progress"], 1);
    assert_eq!(report["summary"]["complete"], 1);
    assert_eq!(report["summary"]["blocked"], 1);
    assert_eq!(report["tasks"][1]["status"], "in_progress");
    assert_eq!(report["tasks"][3]["id"], "task-4");
}

#[test]
fn init_then_prompt_renders_starter_task() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = ralph(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("ralph.toml").is_file());
    assert!(temp.path().join("progress.txt").is_file());

    let output = ralph(temp.path(), &["prompt"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("1. Implement the task: Replace this task"));
}

#[test]
fn prd_print_renders_generation_prompt() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_workspace(temp.path(), &InitOptions { force: false }).expect("init");

    let output = ralph(temp.path(), &["prd", "a", "recipe", "tracker", "--print"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("a recipe tracker"));
}

#[test]
fn missing_task_list_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = ralph(temp.path(), &["next"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("read task list"));
}

#[test]
fn invalid_config_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("PRD.md"), "- [ ] one\n").expect("write");
    fs::write(
        temp.path().join("ralph.toml"),
        "[timing]\ninactivity_check_interval_ms = 7000\n",
    )
    .expect("write");

    let output = ralph(temp.path(), &["next"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("evenly divide"));
}
