use serde::{Deserialize, Serialize};

use crate::domain::ExtractionTask;
use crate::queue::TaskStatus;

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusCounts {
    pub available: usize,
    pub acquired: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStatusCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a ExtractionTask>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            counts.add(task.status, 1);
        }
        counts
    }

    pub fn add(&mut self, status: TaskStatus, n: usize) {
        match status {
            TaskStatus::Available => self.available += n,
            TaskStatus::Acquired => self.acquired += n,
            TaskStatus::Completed => self.completed += n,
            TaskStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> usize {
        self.available + self.acquired + self.completed + self.failed
    }
}
