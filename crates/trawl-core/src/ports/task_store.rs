//! TaskStore port - task の正本（source of truth）
//!
//! # 設計原則
//! - `acquire_next` と `resolve` は判定と更新を一つの排他区間（lock / transaction）で行う
//! - 時刻は呼び出し側が渡す（store は Clock を持たない）
//! - 「取れる task がない」は `Ok(None)`。エラーではない

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{ExtractionTask, Network, TaskId, TaskKind};
use crate::error::TrawlError;
use crate::observability::TaskStatusCounts;
use crate::queue::{LeaseToken, Resolution, TaskStatus};

/// Optional filters for [`TaskStore::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub network: Option<Network>,
    pub kind: Option<TaskKind>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn matches(&self, task: &ExtractionTask) -> bool {
        self.network.is_none_or(|n| n == task.network)
            && self.kind.is_none_or(|k| k == task.kind())
            && self.status.is_none_or(|s| s == task.status)
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert or replace by id.
    async fn upsert(&self, task: ExtractionTask) -> Result<(), TrawlError>;

    async fn upsert_many(&self, tasks: Vec<ExtractionTask>) -> Result<(), TrawlError> {
        for task in tasks {
            self.upsert(task).await?;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<ExtractionTask>, TrawlError>;

    /// Atomically lease the oldest acquirable task for `network`.
    ///
    /// Oldest = smallest `created_at`; ties fall back to insertion order
    /// (or id where the backend has no insertion order).
    async fn acquire_next(
        &self,
        network: Network,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<ExtractionTask>, TrawlError>;

    /// Atomically check that `token` is the task's current lease and move the
    /// task to its terminal status.
    async fn resolve(
        &self,
        id: TaskId,
        token: LeaseToken,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ExtractionTask, TrawlError>;

    /// Tasks matching `filter`, oldest first.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractionTask>, TrawlError>;

    async fn counts(&self) -> Result<TaskStatusCounts, TrawlError> {
        let tasks = self.list(&TaskFilter::default()).await?;
        Ok(TaskStatusCounts::from_tasks(&tasks))
    }
}
