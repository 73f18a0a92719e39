//! Extraction results, one variant per task kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountResult {
    pub data_extraction_date: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub following_count: Option<u64>,
    #[serde(default)]
    pub post_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// One post discovered while listing an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListItem {
    pub post_id: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostListResult {
    pub data_extraction_date: DateTime<Utc>,
    pub posts: Vec<PostListItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetailsResult {
    pub data_extraction_date: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub repost_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub share_count: Option<u64>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub has_paid_placement: Option<bool>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
}

/// Tagged with the same `kind` strings as [`TaskKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ExtractionResult {
    #[serde(rename = "extract-account")]
    Account(AccountResult),
    #[serde(rename = "extract-post-list")]
    PostList(PostListResult),
    #[serde(rename = "extract-post-details")]
    PostDetails(PostDetailsResult),
}

impl ExtractionResult {
    pub fn kind(&self) -> TaskKind {
        match self {
            ExtractionResult::Account(_) => TaskKind::Account,
            ExtractionResult::PostList(_) => TaskKind::PostList,
            ExtractionResult::PostDetails(_) => TaskKind::PostDetails,
        }
    }
}
