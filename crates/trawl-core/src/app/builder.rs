//! TaskServiceBuilder - TaskService の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に lease の長さを検証する
//! - clock / id generator を省略すると SystemClock / UlidGenerator になる

use std::sync::Arc;

use chrono::TimeDelta;

use super::fanout::FanOut;
use super::persist::ResultPersister;
use super::service::TaskService;
use crate::config::TrawlConfig;
use crate::ports::{Clock, IdGenerator, ResultSink, SystemClock, TaskStore, UlidGenerator};
use crate::queue::DEFAULT_LEASE_DURATION;

/// # 使用例
/// ```ignore
/// let service = TaskServiceBuilder::new(store, sink)
///     .clock(clock)
///     .create_detail_tasks(false)
///     .build()?;
/// ```
pub struct TaskServiceBuilder {
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn ResultSink>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    lease_duration: TimeDelta,
    create_detail_tasks: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("lease duration must be positive, got {0}")]
    NonPositiveLease(TimeDelta),
}

impl TaskServiceBuilder {
    pub fn new(store: Arc<dyn TaskStore>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            store,
            sink,
            clock: None,
            ids: None,
            lease_duration: DEFAULT_LEASE_DURATION,
            create_detail_tasks: true,
        }
    }

    /// Lease length and fan-out switch from a loaded config.
    pub fn with_config(self, config: &TrawlConfig) -> Self {
        self.lease_duration(config.worker.lease_duration())
            .create_detail_tasks(config.fan_out.create_detail_tasks)
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn lease_duration(mut self, lease_duration: TimeDelta) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn create_detail_tasks(mut self, enabled: bool) -> Self {
        self.create_detail_tasks = enabled;
        self
    }

    pub fn build(self) -> Result<TaskService, BuildError> {
        if self.lease_duration <= TimeDelta::zero() {
            return Err(BuildError::NonPositiveLease(self.lease_duration));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())) as Arc<dyn IdGenerator>);
        let fan_out = FanOut::new(
            self.store.clone(),
            self.sink.clone(),
            ids.clone(),
            clock.clone(),
            self.create_detail_tasks,
        );

        Ok(TaskService::new(
            self.store,
            ResultPersister::new(self.sink),
            fan_out,
            clock,
            ids,
            self.lease_duration,
        ))
    }
}
