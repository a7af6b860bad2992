//! Deterministic selection of the next actionable task.

use crate::core::task::{Task, TaskStatus};

/// Which statuses count as actionable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Only `Pending` tasks are picked.
    #[default]
    PendingOnly,
    /// `InProgress` tasks are picked as well, so an interrupted task resumes.
    ResumeInProgress,
}

impl SelectionPolicy {
    pub fn from_resume_flag(resume_in_progress: bool) -> Self {
        if resume_in_progress {
            Self::ResumeInProgress
        } else {
            Self::PendingOnly
        }
    }

    pub fn is_actionable(self, status: TaskStatus) -> bool {
        match self {
            Self::PendingOnly => status == TaskStatus::Pending,
            Self::ResumeInProgress => {
                matches!(status, TaskStatus::Pending | TaskStatus::InProgress)
            }
        }
    }
}

/// First actionable task in document order.
///
/// Returns `None` when nothing is left to do.
pub fn next_actionable_task(tasks: &[Task], policy: SelectionPolicy) -> Option<&Task> {
    tasks.iter().find(|task| policy.is_actionable(task.status))
}
