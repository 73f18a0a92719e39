//! JsonDirSink - ディレクトリに JSON ファイルとして結果を書き出す
//!
//! Layout:
//! - `accounts/<network>-<account_id>.json`
//! - `post_list/<network>-<post_id>.json`
//! - `post_details/<network>-<post_id>.json`
//! - `raw/task-<task_id>.json`
//!
//! ファイル名が自然キーなので、同じ record の再書き込みは上書き（upsert）になる。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::domain::Network;
use crate::error::TrawlError;
use crate::ports::{
    AccountRecord, PostDetailsRecord, PostListItemRecord, RawResultRecord, ResultSink,
};

pub struct JsonDirSink {
    root: PathBuf,
}

impl JsonDirSink {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TrawlError> {
        let root = root.into();
        for dir in ["accounts", "post_list", "post_details", "raw"] {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn write<T: Serialize>(&self, dir: &str, name: &str, value: &T) -> Result<(), TrawlError> {
        let path = self.root.join(dir).join(format!("{name}.json"));
        tokio::fs::write(&path, serde_json::to_vec_pretty(value)?).await?;
        debug!(path = %path.display(), "result written");
        Ok(())
    }
}

/// `network-id`。パス区切りなどファイル名に使えない文字は `_` に置き換える
fn file_stem(network: Network, id: &str) -> String {
    let id: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{network}-{id}")
}

#[async_trait]
impl ResultSink for JsonDirSink {
    async fn record_account(&self, record: AccountRecord) -> Result<(), TrawlError> {
        let name = file_stem(record.network, &record.account_id);
        self.write("accounts", &name, &record).await
    }

    async fn record_post_list_item(&self, record: PostListItemRecord) -> Result<(), TrawlError> {
        let name = file_stem(record.network, &record.post_id);
        self.write("post_list", &name, &record).await
    }

    async fn record_post_details(&self, record: PostDetailsRecord) -> Result<(), TrawlError> {
        let name = file_stem(record.network, &record.post_id);
        self.write("post_details", &name, &record).await
    }

    async fn record_raw_result(&self, record: RawResultRecord) -> Result<(), TrawlError> {
        let name = format!("task-{}", record.task_id);
        self.write("raw", &name, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountResult;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case::plain("UC123", "youtube-UC123")]
    #[case::handle("@alice.b", "youtube-@alice.b")]
    #[case::path_like("../etc/passwd", "youtube-.._etc_passwd")]
    fn file_stems_are_safe(#[case] id: &str, #[case] expected: &str) {
        assert_eq!(file_stem(Network::Youtube, id), expected);
    }

    #[tokio::test]
    async fn account_is_written_under_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::open(dir.path()).await.unwrap();

        let record = AccountRecord {
            network: Network::Instagram,
            account_id: "alice".into(),
            result: AccountResult {
                data_extraction_date: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
                description: Some("hi".into()),
                follower_count: Some(10),
                following_count: None,
                post_count: None,
                view_count: None,
                like_count: None,
                categories: vec![],
            },
        };
        sink.record_account(record.clone()).await.unwrap();
        sink.record_account(record).await.unwrap();

        let path = dir.path().join("accounts").join("instagram-alice.json");
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(written["account_id"], "alice");
        assert_eq!(written["follower_count"], 10);
        assert_eq!(std::fs::read_dir(dir.path().join("accounts")).unwrap().count(), 1);
    }
}
