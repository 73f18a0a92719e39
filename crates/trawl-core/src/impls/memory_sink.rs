//! MemorySink - プロセス内の結果保存先（テスト・`serve --store memory` 用）

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::Network;
use crate::error::TrawlError;
use crate::ports::{
    AccountRecord, PostDetailsRecord, PostListItemRecord, RawResultRecord, ResultSink,
};

type Key = (Network, String);

#[derive(Default)]
struct MemorySinkState {
    accounts: BTreeMap<Key, AccountRecord>,
    post_list_items: BTreeMap<Key, PostListItemRecord>,
    post_details: BTreeMap<Key, PostDetailsRecord>,
    raw_results: Vec<RawResultRecord>,
}

/// BTreeMap で `(network, id)` ごとに upsert する
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn accounts(&self) -> Vec<AccountRecord> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    pub async fn post_list_items(&self) -> Vec<PostListItemRecord> {
        self.state
            .lock()
            .await
            .post_list_items
            .values()
            .cloned()
            .collect()
    }

    pub async fn post_details(&self) -> Vec<PostDetailsRecord> {
        self.state
            .lock()
            .await
            .post_details
            .values()
            .cloned()
            .collect()
    }

    pub async fn raw_results(&self) -> Vec<RawResultRecord> {
        self.state.lock().await.raw_results.clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record_account(&self, record: AccountRecord) -> Result<(), TrawlError> {
        let key = (record.network, record.account_id.clone());
        self.state.lock().await.accounts.insert(key, record);
        Ok(())
    }

    async fn record_post_list_item(&self, record: PostListItemRecord) -> Result<(), TrawlError> {
        let key = (record.network, record.post_id.clone());
        self.state.lock().await.post_list_items.insert(key, record);
        Ok(())
    }

    async fn record_post_details(&self, record: PostDetailsRecord) -> Result<(), TrawlError> {
        let key = (record.network, record.post_id.clone());
        self.state.lock().await.post_details.insert(key, record);
        Ok(())
    }

    async fn record_raw_result(&self, record: RawResultRecord) -> Result<(), TrawlError> {
        self.state.lock().await.raw_results.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn membership(post_id: &str, account_id: &str) -> PostListItemRecord {
        PostListItemRecord {
            network: Network::Youtube,
            post_id: post_id.into(),
            account_id: account_id.into(),
            published_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn records_are_upserted_by_network_and_id() {
        let sink = MemorySink::new();
        sink.record_post_list_item(membership("p1", "alice")).await.unwrap();
        sink.record_post_list_item(membership("p1", "bob")).await.unwrap();
        sink.record_post_list_item(membership("p2", "alice")).await.unwrap();

        let items = sink.post_list_items().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].account_id, "bob");
    }
}
