//! Task status for the lease queue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrawlError;

/// Task status.
///
/// State transitions:
/// - Available -> Acquired -> Completed
/// - Available -> Acquired -> Failed
/// - Acquired (lease expired) -> Acquired (reclaimed by another worker)
///
/// Design note: 期限切れの lease は status を戻さず、`visible_at < now` で再取得可能とみなす。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Never leased yet.
    Available,

    /// Leased until `visible_at`.
    Acquired,

    Completed,

    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Available,
        TaskStatus::Acquired,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Available => "AVAILABLE",
            TaskStatus::Acquired => "ACQUIRED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| TrawlError::TaskDecode(format!("unknown task status: {s}")))
    }
}
