//! Extractor port - プラットフォームごとの抽出処理
//!
//! 実際のスクレイピング実装はこの crate の外に置く。ループは task kind に応じて
//! 3 つの操作のどれか一つだけを呼ぶ。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AccountResult, PostDetailsResult, PostListResult};
use crate::error::ExtractorError;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_account(&self, account_id: &str) -> Result<AccountResult, ExtractorError>;

    /// Posts published within `[published_after, published_before]`.
    async fn extract_post_list(
        &self,
        account_id: &str,
        published_after: DateTime<Utc>,
        published_before: DateTime<Utc>,
    ) -> Result<PostListResult, ExtractorError>;

    async fn extract_post_details(&self, post_id: &str) -> Result<PostDetailsResult, ExtractorError>;
}
