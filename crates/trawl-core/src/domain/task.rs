//! Extraction task and its kind-specific configuration.
//!
//! Design:
//! - `kind` は `TaskConfig` の variant から導出する（タグと config が食い違う状態を作れない）
//! - wire 形式は `{id, network, kind, config, status, visible_at?, error?, created_at}`
//! - decode 時に kind と config の整合性、status と visible_at / error の整合性を検証する

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::{Network, TaskId};
use crate::error::TrawlError;
use crate::queue::TaskStatus;

/// What a task asks the extractor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "extract-account")]
    Account,
    #[serde(rename = "extract-post-list")]
    PostList,
    #[serde(rename = "extract-post-details")]
    PostDetails,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Account, TaskKind::PostList, TaskKind::PostDetails];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Account => "extract-account",
            TaskKind::PostList => "extract-post-list",
            TaskKind::PostDetails => "extract-post-details",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TrawlError::TaskDecode(format!("unknown task kind: {s}")))
    }
}

// ========================================
// Kind-specific configs
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountTaskConfig {
    pub account_id: String,
}

/// Post list window. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostListTaskConfig {
    pub account_id: String,
    pub published_after: DateTime<Utc>,
    pub published_before: DateTime<Utc>,
}

impl PostListTaskConfig {
    pub fn contains(&self, published_at: DateTime<Utc>) -> bool {
        self.published_after <= published_at && published_at <= self.published_before
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostDetailsTaskConfig {
    pub post_id: String,
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaskConfig {
    Account(AccountTaskConfig),
    PostList(PostListTaskConfig),
    PostDetails(PostDetailsTaskConfig),
}

impl TaskConfig {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskConfig::Account(_) => TaskKind::Account,
            TaskConfig::PostList(_) => TaskKind::PostList,
            TaskConfig::PostDetails(_) => TaskKind::PostDetails,
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            TaskConfig::Account(c) => &c.account_id,
            TaskConfig::PostList(c) => &c.account_id,
            TaskConfig::PostDetails(c) => &c.account_id,
        }
    }

    /// Decode a raw JSON config against the declared kind.
    pub fn from_parts(kind: TaskKind, config: serde_json::Value) -> Result<Self, TrawlError> {
        let decoded = match kind {
            TaskKind::Account => serde_json::from_value(config).map(TaskConfig::Account),
            TaskKind::PostList => serde_json::from_value(config).map(TaskConfig::PostList),
            TaskKind::PostDetails => serde_json::from_value(config).map(TaskConfig::PostDetails),
        };
        let config = decoded
            .map_err(|e| TrawlError::TaskDecode(format!("config does not fit kind {kind}: {e}")))?;

        if let TaskConfig::PostList(c) = &config
            && c.published_after > c.published_before
        {
            return Err(TrawlError::TaskDecode(format!(
                "published_after {} is later than published_before {}",
                c.published_after, c.published_before
            )));
        }
        Ok(config)
    }
}

// ========================================
// ExtractionTask
// ========================================

/// A unit of extraction work plus its lease state.
///
/// Invariants (constructor と decode の両方で保証):
/// - `visible_at` is set iff `status == Acquired`
/// - `error` is set only when `status == Failed`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TaskRecordWire")]
pub struct ExtractionTask {
    pub id: TaskId,
    pub network: Network,
    pub config: TaskConfig,
    pub status: TaskStatus,
    pub visible_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionTask {
    /// New AVAILABLE task.
    pub fn new(id: TaskId, network: Network, config: TaskConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            network,
            config,
            status: TaskStatus::Available,
            visible_at: None,
            error: None,
            created_at,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.config.kind()
    }

    /// Rebuild a task from stored columns, validating every invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TaskId,
        network: Network,
        kind: TaskKind,
        config: serde_json::Value,
        status: TaskStatus,
        visible_at: Option<DateTime<Utc>>,
        error: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TrawlError> {
        let config = TaskConfig::from_parts(kind, config)?;

        if (status == TaskStatus::Acquired) != visible_at.is_some() {
            return Err(TrawlError::TaskDecode(format!(
                "task {id}: visible_at must be set exactly when ACQUIRED (status={status})"
            )));
        }
        if error.is_some() && status != TaskStatus::Failed {
            return Err(TrawlError::TaskDecode(format!(
                "task {id}: error present on non-FAILED task (status={status})"
            )));
        }

        Ok(Self {
            id,
            network,
            config,
            status,
            visible_at,
            error,
            created_at,
        })
    }

    /// Raw config as stored on the wire.
    pub fn config_value(&self) -> Result<serde_json::Value, TrawlError> {
        Ok(serde_json::to_value(&self.config)?)
    }
}

#[derive(Serialize)]
struct TaskRecordRef<'a> {
    id: TaskId,
    network: Network,
    kind: TaskKind,
    config: &'a TaskConfig,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    visible_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    created_at: DateTime<Utc>,
}

impl Serialize for ExtractionTask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaskRecordRef {
            id: self.id,
            network: self.network,
            kind: self.kind(),
            config: &self.config,
            status: self.status,
            visible_at: self.visible_at,
            error: self.error.as_deref(),
            created_at: self.created_at,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct TaskRecordWire {
    id: TaskId,
    network: Network,
    kind: TaskKind,
    config: serde_json::Value,
    status: TaskStatus,
    #[serde(default)]
    visible_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TaskRecordWire> for ExtractionTask {
    type Error = TrawlError;

    fn try_from(w: TaskRecordWire) -> Result<Self, Self::Error> {
        ExtractionTask::from_parts(
            w.id,
            w.network,
            w.kind,
            w.config,
            w.status,
            w.visible_at,
            w.error,
            w.created_at,
        )
    }
}
