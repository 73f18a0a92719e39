//! TaskProcessingLoop - タスク処理ループ
//!
//! # フロー
//! 1. `acquire_next(network)` で lease を取る（なければ poll_interval 待つ）
//! 2. task kind に応じて Extractor の操作を一つ呼ぶ
//! 3. 結果を ResultSink に書き、post list なら fan-out
//! 4. COMPLETED にする
//!
//! 2〜3 の失敗は task を FAILED にしてループを続ける。store 自体のエラー
//! （I/O、lease の拒否）はループを止めて呼び出し側に返す。
//!
//! shutdown を受けたら処理中の task はそのまま捨てる。lease は解放しないので、
//! 期限が切れたあと別のワーカーが拾い直す。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{Instrument, info, info_span, warn};

use super::service::TaskService;
use crate::domain::{ExtractionResult, ExtractionTask, Network, TaskConfig, TaskId};
use crate::error::{ExtractorError, TrawlError};
use crate::ports::Extractor;
use crate::queue::LeaseToken;

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    Idle,
    Completed(TaskId),
    Failed(TaskId),
}

pub struct TaskProcessingLoop {
    service: Arc<TaskService>,
    extractor: Arc<dyn Extractor>,
    network: Network,
    poll_interval: Duration,
}

impl TaskProcessingLoop {
    pub fn new(
        service: Arc<TaskService>,
        extractor: Arc<dyn Extractor>,
        network: Network,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            extractor,
            network,
            poll_interval,
        }
    }

    /// Run until the shutdown channel changes (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), TrawlError> {
        info!(network = %self.network, poll_interval = ?self.poll_interval, "processing loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            // 処理中でも shutdown を優先する（future を drop すると lease は残る）
            let step = tokio::select! {
                _ = shutdown.changed() => break,
                step = self.run_once() => step?,
            };

            if step == LoopStep::Idle {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!(network = %self.network, "processing loop stopped");
        Ok(())
    }

    /// One poll-acquire-process cycle. Never sleeps.
    pub async fn run_once(&self) -> Result<LoopStep, TrawlError> {
        let Some(task) = self.service.acquire_next(self.network).await? else {
            return Ok(LoopStep::Idle);
        };

        let span = info_span!(
            "task",
            task_id = %task.id,
            network = %task.network,
            kind = %task.kind()
        );
        self.process(task).instrument(span).await
    }

    async fn process(&self, task: ExtractionTask) -> Result<LoopStep, TrawlError> {
        // acquire_next が返すのは ACQUIRED のみ
        let token = LeaseToken::of(&task).ok_or(TrawlError::LeaseNotCurrent {
            id: task.id,
            status: task.status,
            visible_at: task.visible_at,
        })?;

        let outcome = match self.extract(&task).await {
            Ok(result) => self
                .service
                .record_result(&task, &result)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                self.service.mark_completed(task.id, token).await?;
                Ok(LoopStep::Completed(task.id))
            }
            Err(message) => {
                warn!(error = %message, "processing failed, marking task as failed");
                self.service.fail(task.id, token, message).await?;
                Ok(LoopStep::Failed(task.id))
            }
        }
    }

    async fn extract(&self, task: &ExtractionTask) -> Result<ExtractionResult, ExtractorError> {
        match &task.config {
            TaskConfig::Account(c) => self
                .extractor
                .extract_account(&c.account_id)
                .await
                .map(ExtractionResult::Account),
            TaskConfig::PostList(c) => self
                .extractor
                .extract_post_list(&c.account_id, c.published_after, c.published_before)
                .await
                .map(ExtractionResult::PostList),
            TaskConfig::PostDetails(c) => self
                .extractor
                .extract_post_details(&c.post_id)
                .await
                .map(ExtractionResult::PostDetails),
        }
    }
}
