//! Requirement flags and the numbered instruction steps derived from them.

use serde::{Deserialize, Serialize};

/// Optional quality gates the agent must perform for each task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRequirements {
    pub run_tests: bool,
    pub run_linting: bool,
    pub run_type_check: bool,
    pub write_tests: bool,
    pub update_docs: bool,
    pub commit_changes: bool,
}

impl TaskRequirements {
    pub fn all() -> Self {
        Self {
            run_tests: true,
            run_linting: true,
            run_type_check: true,
            write_tests: true,
            update_docs: true,
            commit_changes: true,
        }
    }

    /// Enabled optional steps in their fixed emission order.
    fn optional_steps(&self) -> impl Iterator<Item = &'static str> {
        [
            (
                self.write_tests,
                "Write unit tests that cover the new behavior",
            ),
            (
                self.run_tests,
                "Run the test suite and make sure every test passes",
            ),
            (
                self.run_type_check,
                "Run the type checker and fix any type errors",
            ),
            (self.run_linting, "Run the linter and fix any lint issues"),
            (
                self.update_docs,
                "Update the documentation to reflect the change",
            ),
            (
                self.commit_changes,
                "Commit the changes with a descriptive commit message",
            ),
        ]
        .into_iter()
        .filter_map(|(enabled, step)| enabled.then_some(step))
    }
}

/// Build the numbered steps the agent follows for one task.
///
/// Always starts with the implementation step and ends with the checkbox
/// update and the progress-log entry; enabled requirements sit in between.
pub fn build_requirements_steps(task_description: &str, requirements: &TaskRequirements) -> Vec<String> {
    let mut steps = Vec::with_capacity(9);
    steps.push(format!("Implement the task: {task_description}"));
    steps.extend(requirements.optional_steps().map(str::to_string));
    steps.push(format!(
        "Mark the task complete in the task list by changing \"- [ ] {task_description}\" to \"- [x] {task_description}\""
    ));
    steps.push(
        "Append a short entry to the progress log describing what was completed".to_string(),
    );

    steps
        .into_iter()
        .enumerate()
        .map(|(idx, step)| format!("{}. {}", idx + 1, step))
        .collect()
}
