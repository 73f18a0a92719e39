//! TaskService - queue の公開操作（register / acquire / complete / fail）
//!
//! store への書き込みはすべてここを通す。時刻は Clock から、lease の長さは
//! builder で決めた値を使う。

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use super::fanout::{FanOut, FanOutReport};
use super::persist::{self, ResultPersister};
use crate::domain::{ExtractionResult, ExtractionTask, Network, TaskConfig, TaskId};
use crate::error::TrawlError;
use crate::observability::TaskStatusCounts;
use crate::ports::{Clock, IdGenerator, TaskFilter, TaskStore};
use crate::queue::{LeaseToken, Resolution, lease};

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    persister: ResultPersister,
    fan_out: FanOut,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    lease_duration: TimeDelta,
}

impl TaskService {
    /// Use [`TaskServiceBuilder`](super::TaskServiceBuilder) instead of calling this directly.
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        persister: ResultPersister,
        fan_out: FanOut,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        lease_duration: TimeDelta,
    ) -> Self {
        Self {
            store,
            persister,
            fan_out,
            clock,
            ids,
            lease_duration,
        }
    }

    pub fn lease_duration(&self) -> TimeDelta {
        self.lease_duration
    }

    pub fn creates_detail_tasks(&self) -> bool {
        self.fan_out.creates_detail_tasks()
    }

    /// New AVAILABLE task with a generated id and `created_at = now`.
    pub fn new_task(&self, network: Network, config: TaskConfig) -> ExtractionTask {
        ExtractionTask::new(self.ids.generate_task_id(), network, config, self.clock.now())
    }

    pub async fn register(
        &self,
        network: Network,
        config: TaskConfig,
    ) -> Result<ExtractionTask, TrawlError> {
        let task = self.new_task(network, config);
        self.store.upsert(task.clone()).await?;
        info!(task_id = %task.id, network = %task.network, kind = %task.kind(), "task registered");
        Ok(task)
    }

    pub async fn register_many(
        &self,
        requests: Vec<(Network, TaskConfig)>,
    ) -> Result<Vec<ExtractionTask>, TrawlError> {
        let tasks: Vec<ExtractionTask> = requests
            .into_iter()
            .map(|(network, config)| self.new_task(network, config))
            .collect();
        self.store.upsert_many(tasks.clone()).await?;
        info!(count = tasks.len(), "tasks registered");
        Ok(tasks)
    }

    pub async fn find(&self, id: TaskId) -> Result<Option<ExtractionTask>, TrawlError> {
        self.store.find_by_id(id).await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractionTask>, TrawlError> {
        self.store.list(filter).await
    }

    pub async fn counts(&self) -> Result<TaskStatusCounts, TrawlError> {
        self.store.counts().await
    }

    /// Lease the oldest acquirable task for `network`. `None` when nothing is acquirable.
    pub async fn acquire_next(&self, network: Network) -> Result<Option<ExtractionTask>, TrawlError> {
        let task = self
            .store
            .acquire_next(network, self.clock.now(), self.lease_duration)
            .await?;
        match &task {
            Some(task) => info!(
                task_id = %task.id,
                network = %task.network,
                kind = %task.kind(),
                visible_at = ?task.visible_at,
                "task acquired"
            ),
            None => debug!(network = %network, "no task available"),
        }
        Ok(task)
    }

    /// Write `result` to the sink and, for post lists, fan out.
    ///
    /// Task の状態は変えない。呼び出し側が続けて `mark_completed` / `fail` する。
    pub async fn record_result(
        &self,
        task: &ExtractionTask,
        result: &ExtractionResult,
    ) -> Result<Option<FanOutReport>, TrawlError> {
        self.persister.persist(task, result).await?;
        match result {
            ExtractionResult::PostList(list) => Ok(Some(self.fan_out.expand(task, list).await?)),
            ExtractionResult::Account(_) | ExtractionResult::PostDetails(_) => Ok(None),
        }
    }

    /// Check the lease, persist the result (with fan-out), then mark COMPLETED.
    ///
    /// `token` は acquire で受け取った lease。別の worker が取り直していれば
    /// `LeaseNotCurrent` で、sink には何も書かない。
    pub async fn complete(
        &self,
        id: TaskId,
        token: LeaseToken,
        result: ExtractionResult,
    ) -> Result<ExtractionTask, TrawlError> {
        let task = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(TrawlError::TaskNotFound(id))?;
        persist::check_kind(&task, &result)?;
        // sink / fan-out に書く前に lease を確認する。最終判定は mark_completed で再度行う
        lease::ensure_resolvable(&task, token, self.clock.now())?;

        self.record_result(&task, &result).await?;
        self.mark_completed(id, token).await
    }

    /// ACQUIRED-and-current -> COMPLETED without touching the sink.
    pub async fn mark_completed(
        &self,
        id: TaskId,
        token: LeaseToken,
    ) -> Result<ExtractionTask, TrawlError> {
        let task = self
            .store
            .resolve(id, token, Resolution::Completed, self.clock.now())
            .await?;
        info!(task_id = %task.id, network = %task.network, kind = %task.kind(), "task completed");
        Ok(task)
    }

    pub async fn fail(
        &self,
        id: TaskId,
        token: LeaseToken,
        message: impl Into<String>,
    ) -> Result<ExtractionTask, TrawlError> {
        let message = message.into();
        let task = self
            .store
            .resolve(id, token, Resolution::Failed(message.clone()), self.clock.now())
            .await?;
        warn!(task_id = %task.id, network = %task.network, kind = %task.kind(), error = %message, "task failed");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::TaskServiceBuilder;
    use crate::domain::{
        AccountResult, AccountTaskConfig, PostListItem, PostListResult, PostListTaskConfig,
        TaskKind,
    };
    use crate::impls::MemorySink;
    use crate::ports::ManualClock;
    use crate::queue::{InMemoryTaskStore, TaskStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        service: TaskService,
        clock: Arc<ManualClock>,
        store: Arc<InMemoryTaskStore>,
        sink: Arc<MemorySink>,
    }

    fn harness(create_detail_tasks: bool) -> Harness {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(InMemoryTaskStore::new());
        let sink = Arc::new(MemorySink::new());
        let service = TaskServiceBuilder::new(store.clone(), sink.clone())
            .clock(clock.clone())
            .create_detail_tasks(create_detail_tasks)
            .build()
            .unwrap();
        Harness {
            service,
            clock,
            store,
            sink,
        }
    }

    fn account(id: &str) -> TaskConfig {
        TaskConfig::Account(AccountTaskConfig {
            account_id: id.into(),
        })
    }

    fn token(task: &ExtractionTask) -> LeaseToken {
        LeaseToken::of(task).unwrap()
    }

    fn account_result() -> ExtractionResult {
        ExtractionResult::Account(AccountResult {
            data_extraction_date: t0(),
            description: Some("bio".into()),
            follower_count: Some(100),
            following_count: Some(1),
            post_count: Some(7),
            view_count: None,
            like_count: None,
            categories: vec![],
        })
    }

    #[tokio::test]
    async fn register_then_acquire_then_complete() {
        let h = harness(true);
        let task = h.service.register(Network::Youtube, account("UC1")).await.unwrap();

        let acquired = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();
        assert_eq!(acquired.id, task.id);
        assert_eq!(acquired.status, TaskStatus::Acquired);
        assert_eq!(acquired.visible_at, Some(t0() + TimeDelta::minutes(15)));

        let done = h
            .service
            .complete(task.id, token(&acquired), account_result())
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.visible_at, None);
        assert_eq!(h.sink.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_lease_is_reacquired_with_a_fresh_expiry() {
        let h = harness(true);
        let task = h.service.register(Network::Tiktok, account("a")).await.unwrap();
        h.service.acquire_next(Network::Tiktok).await.unwrap().unwrap();

        h.clock.advance(TimeDelta::minutes(16));
        let again = h.service.acquire_next(Network::Tiktok).await.unwrap().unwrap();

        assert_eq!(again.id, task.id);
        assert_eq!(
            again.visible_at,
            Some(t0() + TimeDelta::minutes(16) + TimeDelta::minutes(15))
        );
    }

    #[tokio::test]
    async fn completed_task_cannot_be_failed() {
        let h = harness(true);
        let task = h.service.register(Network::Youtube, account("UC1")).await.unwrap();
        let acquired = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();
        h.service
            .complete(task.id, token(&acquired), account_result())
            .await
            .unwrap();

        let err = h.service.fail(task.id, token(&acquired), "late").await.unwrap_err();
        assert!(matches!(err, TrawlError::TaskAlreadyTerminal { .. }));

        let stored = h.service.find(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.error, None);
    }

    #[tokio::test]
    async fn post_list_completion_fans_out() {
        let h = harness(true);
        let parent = h
            .service
            .register(
                Network::Instagram,
                TaskConfig::PostList(PostListTaskConfig {
                    account_id: "alice".into(),
                    published_after: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                    published_before: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                }),
            )
            .await
            .unwrap();
        let acquired = h.service.acquire_next(Network::Instagram).await.unwrap().unwrap();

        let posts = ["p1", "p2", "p3"]
            .iter()
            .map(|id| PostListItem {
                post_id: id.to_string(),
                published_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            })
            .collect();
        h.service
            .complete(
                parent.id,
                token(&acquired),
                ExtractionResult::PostList(PostListResult {
                    data_extraction_date: t0(),
                    posts,
                }),
            )
            .await
            .unwrap();

        let children = h
            .service
            .list(&TaskFilter {
                kind: Some(TaskKind::PostDetails),
                ..TaskFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|t| t.status == TaskStatus::Available));
        assert!(children.iter().all(|t| t.network == Network::Instagram));
        assert_eq!(h.sink.post_list_items().await.len(), 3);
    }

    #[tokio::test]
    async fn acquire_on_empty_network_changes_nothing() {
        let h = harness(true);
        h.service.register(Network::Tiktok, account("a")).await.unwrap();

        assert!(h.service.acquire_next(Network::Youtube).await.unwrap().is_none());
        let counts = h.service.counts().await.unwrap();
        assert_eq!(counts.available, 1);
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn stale_worker_cannot_complete_after_reclaim() {
        let h = harness(true);
        let task = h.service.register(Network::Youtube, account("UC1")).await.unwrap();

        // worker A
        let a = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();
        h.clock.advance(TimeDelta::minutes(16));
        // worker B reclaims the expired lease
        let b = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();
        assert_eq!(b.id, task.id);

        // A comes back while B still holds the task
        let err = h
            .service
            .complete(task.id, token(&a), account_result())
            .await
            .unwrap_err();
        assert!(matches!(err, TrawlError::LeaseNotCurrent { .. }));
        assert!(h.sink.raw_results().await.is_empty());
        let err = h.service.fail(task.id, token(&a), "late").await.unwrap_err();
        assert!(matches!(err, TrawlError::LeaseNotCurrent { .. }));
        assert_eq!(h.store.find_by_id(task.id).await.unwrap().unwrap(), b);

        let done = h
            .service
            .complete(task.id, token(&b), account_result())
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(h.sink.raw_results().await.len(), 1);
    }

    #[tokio::test]
    async fn complete_after_expiry_is_rejected_before_any_write() {
        let h = harness(true);
        let task = h.service.register(Network::Youtube, account("UC1")).await.unwrap();
        let acquired = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();
        h.clock.advance(TimeDelta::minutes(15));

        let err = h
            .service
            .complete(task.id, token(&acquired), account_result())
            .await
            .unwrap_err();

        assert!(matches!(err, TrawlError::LeaseNotCurrent { .. }));
        assert!(h.sink.raw_results().await.is_empty());
    }

    #[tokio::test]
    async fn wrong_result_variant_leaves_task_untouched() {
        let h = harness(true);
        let task = h.service.register(Network::Youtube, account("UC1")).await.unwrap();
        let acquired = h.service.acquire_next(Network::Youtube).await.unwrap().unwrap();

        let err = h
            .service
            .complete(
                task.id,
                token(&acquired),
                ExtractionResult::PostList(PostListResult {
                    data_extraction_date: t0(),
                    posts: vec![],
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TrawlError::ResultKindMismatch { kind: TaskKind::Account, result: TaskKind::PostList, .. }
        ));
        assert_eq!(h.store.find_by_id(task.id).await.unwrap().unwrap(), acquired);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let h = harness(true);
        let id = TaskId::from(ulid::Ulid::new());
        let token = LeaseToken::new(t0());

        assert!(matches!(
            h.service.fail(id, token, "x").await.unwrap_err(),
            TrawlError::TaskNotFound(_)
        ));
        assert!(matches!(
            h.service.complete(id, token, account_result()).await.unwrap_err(),
            TrawlError::TaskNotFound(_)
        ));
    }
}
