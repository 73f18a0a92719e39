//! ResultSink port - 抽出結果の保存先
//!
//! 各 record は `(network, 自然キー)` で upsert される。同じ task を二度処理しても
//! 行が増えない（post list のメンバーシップは `(network, post_id)` がキー）。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountResult, ExtractionResult, ExtractionTask, Network, PostDetailsResult, TaskId,
};
use crate::error::TrawlError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub network: Network,
    pub account_id: String,
    #[serde(flatten)]
    pub result: AccountResult,
}

/// Membership of a post in an account's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListItemRecord {
    pub network: Network,
    pub post_id: String,
    pub account_id: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetailsRecord {
    pub network: Network,
    pub post_id: String,
    pub account_id: String,
    #[serde(flatten)]
    pub result: PostDetailsResult,
}

/// Raw result as returned by the extractor, kept per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultRecord {
    pub task_id: TaskId,
    pub network: Network,
    pub result: ExtractionResult,
}

impl RawResultRecord {
    pub fn new(task: &ExtractionTask, result: &ExtractionResult) -> Self {
        Self {
            task_id: task.id,
            network: task.network,
            result: result.clone(),
        }
    }
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_account(&self, record: AccountRecord) -> Result<(), TrawlError>;

    async fn record_post_list_item(&self, record: PostListItemRecord) -> Result<(), TrawlError>;

    async fn record_post_details(&self, record: PostDetailsRecord) -> Result<(), TrawlError>;

    async fn record_raw_result(&self, record: RawResultRecord) -> Result<(), TrawlError>;
}
