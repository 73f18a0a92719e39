//! In-memory task store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use super::{LeaseToken, Resolution, lease};
use crate::domain::{ExtractionTask, Network, TaskId};
use crate::error::TrawlError;
use crate::observability::TaskStatusCounts;
use crate::ports::{TaskFilter, TaskStore};

/// Stored task plus its insertion sequence (tie-break for equal `created_at`).
#[derive(Debug, Clone)]
struct StoredTask {
    seq: u64,
    task: ExtractionTask,
}

struct InMemoryStoreState {
    /// All task records (single source of truth).
    records: HashMap<TaskId, StoredTask>,

    next_seq: u64,
}

impl InMemoryStoreState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    fn upsert(&mut self, task: ExtractionTask) {
        // 既存 id は順序を保ったまま中身だけ差し替える
        if let Some(stored) = self.records.get_mut(&task.id) {
            stored.task = task;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(task.id, StoredTask { seq, task });
    }

    fn sorted<'a>(&'a self, filter: &'a TaskFilter) -> Vec<&'a StoredTask> {
        let mut matching: Vec<&StoredTask> = self
            .records
            .values()
            .filter(|s| filter.matches(&s.task))
            .collect();
        matching.sort_by_key(|s| (s.task.created_at, s.seq));
        matching
    }
}

/// Task store held in process memory.
///
/// Single tokio mutex. acquire / resolve の判定と更新は同じロック区間で行う。
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<InMemoryStoreState>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryStoreState::new())),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn upsert(&self, task: ExtractionTask) -> Result<(), TrawlError> {
        self.state.lock().await.upsert(task);
        Ok(())
    }

    async fn upsert_many(&self, tasks: Vec<ExtractionTask>) -> Result<(), TrawlError> {
        let mut state = self.state.lock().await;
        for task in tasks {
            state.upsert(task);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<ExtractionTask>, TrawlError> {
        let state = self.state.lock().await;
        Ok(state.records.get(&id).map(|s| s.task.clone()))
    }

    async fn acquire_next(
        &self,
        network: Network,
        now: DateTime<Utc>,
        lease_duration: TimeDelta,
    ) -> Result<Option<ExtractionTask>, TrawlError> {
        let mut state = self.state.lock().await;

        let next = state
            .records
            .values()
            .filter(|s| s.task.network == network && lease::is_acquirable(&s.task, now))
            .min_by_key(|s| (s.task.created_at, s.seq))
            .map(|s| s.task.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(stored) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        lease::acquire(&mut stored.task, now, lease_duration)?;
        Ok(Some(stored.task.clone()))
    }

    async fn resolve(
        &self,
        id: TaskId,
        token: LeaseToken,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ExtractionTask, TrawlError> {
        let mut state = self.state.lock().await;
        let stored = state
            .records
            .get_mut(&id)
            .ok_or(TrawlError::TaskNotFound(id))?;

        lease::resolve(&mut stored.task, token, resolution, now)?;
        Ok(stored.task.clone())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractionTask>, TrawlError> {
        let state = self.state.lock().await;
        Ok(state
            .sorted(filter)
            .into_iter()
            .map(|s| s.task.clone())
            .collect())
    }

    async fn counts(&self) -> Result<TaskStatusCounts, TrawlError> {
        let state = self.state.lock().await;
        Ok(TaskStatusCounts::from_tasks(
            state.records.values().map(|s| &s.task),
        ))
    }
}
