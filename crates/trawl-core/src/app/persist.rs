//! ResultPersister - 抽出結果を kind ごとの record に振り分けて ResultSink に渡す

use std::sync::Arc;

use crate::domain::{ExtractionResult, ExtractionTask, TaskConfig};
use crate::error::TrawlError;
use crate::ports::{AccountRecord, PostDetailsRecord, RawResultRecord, ResultSink};

/// Fail with `ResultKindMismatch` unless `result` is the variant for the task's kind.
pub fn check_kind(task: &ExtractionTask, result: &ExtractionResult) -> Result<(), TrawlError> {
    if task.kind() != result.kind() {
        return Err(TrawlError::ResultKindMismatch {
            id: task.id,
            kind: task.kind(),
            result: result.kind(),
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct ResultPersister {
    sink: Arc<dyn ResultSink>,
}

impl ResultPersister {
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self { sink }
    }

    /// Raw result + kind-specific record.
    ///
    /// POST_LIST のメンバーシップは fan-out 側で書く。
    pub async fn persist(
        &self,
        task: &ExtractionTask,
        result: &ExtractionResult,
    ) -> Result<(), TrawlError> {
        check_kind(task, result)?;
        self.sink
            .record_raw_result(RawResultRecord::new(task, result))
            .await?;

        match (&task.config, result) {
            (TaskConfig::Account(config), ExtractionResult::Account(account)) => {
                self.sink
                    .record_account(AccountRecord {
                        network: task.network,
                        account_id: config.account_id.clone(),
                        result: account.clone(),
                    })
                    .await
            }
            (TaskConfig::PostList(_), ExtractionResult::PostList(_)) => Ok(()),
            (TaskConfig::PostDetails(config), ExtractionResult::PostDetails(details)) => {
                self.sink
                    .record_post_details(PostDetailsRecord {
                        network: task.network,
                        post_id: config.post_id.clone(),
                        account_id: config.account_id.clone(),
                        result: details.clone(),
                    })
                    .await
            }
            _ => Err(TrawlError::ResultKindMismatch {
                id: task.id,
                kind: task.kind(),
                result: result.kind(),
            }),
        }
    }
}
