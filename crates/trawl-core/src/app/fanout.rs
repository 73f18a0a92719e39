//! Fan-out: a POST_LIST result becomes list memberships plus POST_DETAILS tasks.
//!
//! Design:
//! - 親 task の窓 `[published_after, published_before]` の外にある item も捨てない。
//!   warn を出して `outside_window` に数えるだけで、メンバーシップも子 task も作る
//! - 子 task の dedupe はしない。同じ post が別の post list に出てくれば子 task も二つできる
//! - `create_detail_tasks = false` ならメンバーシップだけ書く

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    ExtractionTask, PostDetailsTaskConfig, PostListResult, TaskConfig, TaskId, TaskKind,
};
use crate::error::TrawlError;
use crate::ports::{Clock, IdGenerator, PostListItemRecord, ResultSink, TaskStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub memberships: usize,
    pub children: Vec<TaskId>,
    /// items whose `published_at` falls outside the parent's window (still fanned out)
    pub outside_window: usize,
}

#[derive(Clone)]
pub struct FanOut {
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn ResultSink>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    create_detail_tasks: bool,
}

impl FanOut {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sink: Arc<dyn ResultSink>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        create_detail_tasks: bool,
    ) -> Self {
        Self {
            store,
            sink,
            ids,
            clock,
            create_detail_tasks,
        }
    }

    pub fn creates_detail_tasks(&self) -> bool {
        self.create_detail_tasks
    }

    pub async fn expand(
        &self,
        parent: &ExtractionTask,
        result: &PostListResult,
    ) -> Result<FanOutReport, TrawlError> {
        let TaskConfig::PostList(window) = &parent.config else {
            return Err(TrawlError::ResultKindMismatch {
                id: parent.id,
                kind: parent.kind(),
                result: TaskKind::PostList,
            });
        };

        let now = self.clock.now();
        let mut report = FanOutReport::default();
        let mut children = Vec::new();

        for item in &result.posts {
            if !window.contains(item.published_at) {
                warn!(
                    task_id = %parent.id,
                    post_id = %item.post_id,
                    published_at = %item.published_at,
                    "post outside the requested window"
                );
                report.outside_window += 1;
            }

            self.sink
                .record_post_list_item(PostListItemRecord {
                    network: parent.network,
                    post_id: item.post_id.clone(),
                    account_id: window.account_id.clone(),
                    published_at: item.published_at,
                })
                .await?;
            report.memberships += 1;

            if self.create_detail_tasks {
                children.push(ExtractionTask::new(
                    self.ids.generate_task_id(),
                    parent.network,
                    TaskConfig::PostDetails(PostDetailsTaskConfig {
                        post_id: item.post_id.clone(),
                        account_id: window.account_id.clone(),
                    }),
                    now,
                ));
            }
        }

        report.children = children.iter().map(|t| t.id).collect();
        if !children.is_empty() {
            self.store.upsert_many(children).await?;
        }

        info!(
            task_id = %parent.id,
            network = %parent.network,
            memberships = report.memberships,
            children = report.children.len(),
            outside_window = report.outside_window,
            "post list fanned out"
        );
        Ok(report)
    }
}
