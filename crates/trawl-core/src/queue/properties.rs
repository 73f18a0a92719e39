//! Property tests for the lease state machine over the in-memory store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use ulid::Ulid;

use super::{DEFAULT_LEASE_DURATION, InMemoryTaskStore, LeaseToken, Resolution, TaskStatus};
use crate::domain::{
    AccountTaskConfig, ExtractionTask, Network, PostListTaskConfig, TaskConfig, TaskId,
};
use crate::ports::{TaskFilter, TaskStore};

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize),
    /// task index, and whether to present the oldest token issued instead of the newest
    Complete(usize, bool),
    Fail(usize, bool),
    Advance(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..Network::ALL.len()).prop_map(Op::Acquire),
        (0..8usize, any::<bool>()).prop_map(|(i, oldest)| Op::Complete(i, oldest)),
        (0..8usize, any::<bool>()).prop_map(|(i, oldest)| Op::Fail(i, oldest)),
        (0..40i64).prop_map(Op::Advance),
    ]
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn seed_tasks() -> Vec<ExtractionTask> {
    (0..8)
        .map(|i| {
            ExtractionTask::new(
                TaskId::from(Ulid::new()),
                Network::ALL[i % Network::ALL.len()],
                TaskConfig::Account(AccountTaskConfig {
                    account_id: format!("account-{i}"),
                }),
                start() + TimeDelta::seconds(i as i64),
            )
        })
        .collect()
}

fn check_record_invariants(task: &ExtractionTask) {
    assert_eq!(
        task.status == TaskStatus::Acquired,
        task.visible_at.is_some(),
        "visible_at must be set exactly when ACQUIRED: {task:?}"
    );
    if task.error.is_some() {
        assert_eq!(task.status, TaskStatus::Failed);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lease_invariants_hold_for_any_schedule(ops in prop::collection::vec(op(), 1..60)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let store = InMemoryTaskStore::new();
            let tasks = seed_tasks();
            let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
            store.upsert_many(tasks).await.unwrap();

            let mut now = start();
            let mut terminal: HashMap<TaskId, ExtractionTask> = HashMap::new();
            // acquire ごとに発行された token（古い順）
            let mut issued: HashMap<TaskId, Vec<LeaseToken>> = HashMap::new();

            for op in ops {
                match op {
                    Op::Acquire(n) => {
                        if let Some(task) = store
                            .acquire_next(Network::ALL[n], now, DEFAULT_LEASE_DURATION)
                            .await
                            .unwrap()
                        {
                            assert!(!terminal.contains_key(&task.id), "terminal task re-acquired");
                            assert_eq!(task.visible_at, Some(now + DEFAULT_LEASE_DURATION));
                            let token = LeaseToken::of(&task).unwrap();
                            let tokens = issued.entry(task.id).or_default();
                            assert!(!tokens.contains(&token), "lease token reissued");
                            tokens.push(token);
                        }
                    }
                    Op::Complete(i, oldest) | Op::Fail(i, oldest) => {
                        let resolution = match op {
                            Op::Complete(..) => Resolution::Completed,
                            _ => Resolution::Failed("boom".into()),
                        };
                        let tokens = issued.get(&ids[i]).cloned().unwrap_or_default();
                        let presented = if oldest { tokens.first() } else { tokens.last() };
                        let token = presented.copied().unwrap_or(LeaseToken::new(now));
                        let result = store.resolve(ids[i], token, resolution, now).await;
                        if result.is_ok() {
                            assert_eq!(Some(&token), tokens.last(), "resolved with a superseded lease");
                        }
                    }
                    Op::Advance(minutes) => now += TimeDelta::minutes(minutes),
                }

                for task in store.list(&TaskFilter::default()).await.unwrap() {
                    check_record_invariants(&task);
                    if let Some(before) = terminal.get(&task.id) {
                        assert_eq!(&task, before, "terminal task changed");
                    } else if task.status.is_terminal() {
                        terminal.insert(task.id, task);
                    }
                }
            }
        });
    }

    #[test]
    fn post_list_config_survives_the_wire(
        account in "[a-zA-Z0-9_.@-]{1,24}",
        after_secs in 0i64..2_000_000_000,
        span_secs in 0i64..100_000_000,
    ) {
        let after = Utc.timestamp_opt(after_secs, 0).unwrap();
        let task = ExtractionTask::new(
            TaskId::from(Ulid::new()),
            Network::Youtube,
            TaskConfig::PostList(PostListTaskConfig {
                account_id: account,
                published_after: after,
                published_before: after + TimeDelta::seconds(span_secs),
            }),
            after,
        );

        let line = serde_json::to_string(&task).unwrap();
        let back: ExtractionTask = serde_json::from_str(&line).unwrap();
        prop_assert_eq!(back, task);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquirers_never_share_a_task() {
    let store = Arc::new(InMemoryTaskStore::new());
    let tasks: Vec<ExtractionTask> = (0..50)
        .map(|i| {
            ExtractionTask::new(
                TaskId::from(Ulid::new()),
                Network::Tiktok,
                TaskConfig::Account(AccountTaskConfig {
                    account_id: format!("a{i}"),
                }),
                start(),
            )
        })
        .collect();
    store.upsert_many(tasks).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(task) = store
                .acquire_next(Network::Tiktok, start(), DEFAULT_LEASE_DURATION)
                .await
                .unwrap()
            {
                got.push(task.id);
            }
            got
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), 50);
    assert_eq!(unique.len(), 50);
}
