//! FixtureExtractor - 事前に取得済みの JSON を返す Extractor
//!
//! 実プラットフォームへのアクセスなしにパイプライン全体を動かすためのもの。
//!
//! Layout:
//! - `<root>/accounts/<account_id>.json`   -> AccountResult
//! - `<root>/post_lists/<account_id>.json` -> PostListResult
//! - `<root>/posts/<post_id>.json`         -> PostDetailsResult

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::domain::{AccountResult, PostDetailsResult, PostListResult};
use crate::error::ExtractorError;
use crate::ports::Extractor;

pub struct FixtureExtractor {
    root: PathBuf,
}

impl FixtureExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn load<T: DeserializeOwned>(
        &self,
        dir: &str,
        what: &'static str,
        id: &str,
    ) -> Result<T, ExtractorError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == ".." {
            return Err(ExtractorError::NotFound {
                what,
                id: id.to_string(),
            });
        }
        let path = self.root.join(dir).join(format!("{id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractorError::NotFound {
                    what,
                    id: id.to_string(),
                });
            }
            Err(source) => return Err(ExtractorError::Fixture { path, source }),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Extractor for FixtureExtractor {
    async fn extract_account(&self, account_id: &str) -> Result<AccountResult, ExtractorError> {
        self.load("accounts", "account", account_id).await
    }

    async fn extract_post_list(
        &self,
        account_id: &str,
        published_after: DateTime<Utc>,
        published_before: DateTime<Utc>,
    ) -> Result<PostListResult, ExtractorError> {
        let mut list: PostListResult = self.load("post_lists", "post list", account_id).await?;
        list.posts
            .retain(|p| published_after <= p.published_at && p.published_at <= published_before);
        Ok(list)
    }

    async fn extract_post_details(&self, post_id: &str) -> Result<PostDetailsResult, ExtractorError> {
        self.load("posts", "post", post_id).await
    }
}
