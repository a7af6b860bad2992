//! Task records produced by the task-list parser.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Checkbox state of a task line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
    Blocked,
}

impl TaskStatus {
    /// Map a checkbox marker character to a status.
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Pending),
            'x' | 'X' => Some(Self::Complete),
            '~' => Some(Self::InProgress),
            '!' => Some(Self::Blocked),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
        }
    }
}

/// A single checkbox line from the task list.
///
/// Records are rebuilt on every parse. `id` is stable within one parse only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// `task-<n>` where `n` is the 1-based ordinal among matched lines.
    pub id: String,
    /// Trimmed description text, otherwise verbatim.
    pub description: String,
    pub status: TaskStatus,
    /// 1-based position in the normalized line sequence.
    pub line_number: usize,
    /// Full line without any line-ending bytes.
    pub raw_line: String,
}

/// Record of a task the loop finished reviewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCompletion {
    pub task_description: String,
    pub completed_at: DateTime<Utc>,
    pub duration: Duration,
    /// 1-based loop iteration that produced this completion.
    pub iteration: u32,
}

/// Per-status counts for a parsed task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub blocked: usize,
}

impl TaskSummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut summary = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Complete => summary.complete += 1,
                TaskStatus::Blocked => summary.blocked += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.complete + self.blocked
    }
}
