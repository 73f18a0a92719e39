//! JSON-lines file task store.
//!
//! One task per line. Every mutation reads the whole file, applies the change
//! and rewrites it through a temp file + rename.
//!
//! Design note: 排他は process 内の mutex のみ。複数プロセスから同じファイルを
//! 共有する用途には postgres backend を使う。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{LeaseToken, Resolution, lease};
use crate::domain::{ExtractionTask, Network, TaskId};
use crate::error::TrawlError;
use crate::ports::{TaskFilter, TaskStore};

pub struct JsonFileTaskStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileTaskStore {
    /// Open (or lazily create) the store at `path`. Parent directories are created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TrawlError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every stored task and write `tasks` instead.
    pub async fn replace_all(&self, tasks: Vec<ExtractionTask>) -> Result<(), TrawlError> {
        let _guard = self.lock.lock().await;
        self.write_all(&tasks).await
    }

    async fn read_all(&self) -> Result<Vec<ExtractionTask>, TrawlError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    TrawlError::TaskDecode(format!("{}:{}: {e}", self.path.display(), n + 1))
                })
            })
            .collect()
    }

    async fn write_all(&self, tasks: &[ExtractionTask]) -> Result<(), TrawlError> {
        let mut out = String::new();
        for task in tasks {
            out.push_str(&serde_json::to_string(task)?);
            out.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, out).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), tasks = tasks.len(), "task file rewritten");
        Ok(())
    }

    fn upsert_into(tasks: &mut Vec<ExtractionTask>, task: ExtractionTask) {
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => tasks.push(task),
        }
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn upsert(&self, task: ExtractionTask) -> Result<(), TrawlError> {
        self.upsert_many(vec![task]).await
    }

    async fn upsert_many(&self, new_tasks: Vec<ExtractionTask>) -> Result<(), TrawlError> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.read_all().await?;
        for task in new_tasks {
            Self::upsert_into(&mut tasks, task);
        }
        self.write_all(&tasks).await
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<ExtractionTask>, TrawlError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_iter().find(|t| t.id == id))
    }

    async fn acquire_next(
        &self,
        network: Network,
        now: DateTime<Utc>,
        lease_duration: TimeDelta,
    ) -> Result<Option<ExtractionTask>, TrawlError> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.read_all().await?;

        // ファイル上の位置が挿入順。min_by_key は同値なら先頭を返す
        let next = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.network == network && lease::is_acquirable(t, now))
            .min_by_key(|(pos, t)| (t.created_at, *pos))
            .map(|(pos, _)| pos);

        let Some(pos) = next else {
            return Ok(None);
        };
        lease::acquire(&mut tasks[pos], now, lease_duration)?;
        let acquired = tasks[pos].clone();
        self.write_all(&tasks).await?;
        Ok(Some(acquired))
    }

    async fn resolve(
        &self,
        id: TaskId,
        token: LeaseToken,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ExtractionTask, TrawlError> {
        let _guard = self.lock.lock().await;
        let mut tasks = self.read_all().await?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TrawlError::TaskNotFound(id))?;

        lease::resolve(task, token, resolution, now)?;
        let resolved = task.clone();
        self.write_all(&tasks).await?;
        Ok(resolved)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractionTask>, TrawlError> {
        let _guard = self.lock.lock().await;
        let mut tasks: Vec<_> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        // stable sort: 同時刻はファイル順
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}
