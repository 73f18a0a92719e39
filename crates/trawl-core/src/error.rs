//! Error types for the task lease queue.
//!
//! - `TrawlError`: store / lease / persistence failures (queue 全体で共通)
//! - `ExtractorError`: extractor が返す失敗。ループ内で FAILED に変換される
//! - `ConfigError`: 設定ファイルの読み込み・検証エラー

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{TaskId, TaskKind};
use crate::queue::TaskStatus;

#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {id} is already terminal (status={status})")]
    TaskAlreadyTerminal { id: TaskId, status: TaskStatus },

    #[error("lease is not current for task {id} (status={status}, visible_at={visible_at:?})")]
    LeaseNotCurrent {
        id: TaskId,
        status: TaskStatus,
        visible_at: Option<DateTime<Utc>>,
    },

    #[error("task {id} is leased until {visible_at}")]
    LeaseHeld {
        id: TaskId,
        visible_at: DateTime<Utc>,
    },

    #[error("result kind {result} does not match task {id} of kind {kind}")]
    ResultKindMismatch {
        id: TaskId,
        kind: TaskKind,
        result: TaskKind,
    },

    #[error("status {0} cannot be set directly")]
    UnsupportedStatusUpdate(TaskStatus),

    #[error("invalid task record: {0}")]
    TaskDecode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store backend `{0}` is not available in this build")]
    BackendUnavailable(&'static str),
}

impl TrawlError {
    /// Lease / state machine による拒否かどうか。
    ///
    /// I/O 系とは違い、呼び出し側の操作が現在の状態と噛み合っていないことを表す。
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            TrawlError::TaskAlreadyTerminal { .. }
                | TrawlError::LeaseNotCurrent { .. }
                | TrawlError::LeaseHeld { .. }
        )
    }
}

/// Failure reported by an [`Extractor`](crate::ports::Extractor).
///
/// Display の文字列がそのまま task の `error` に記録される。
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("failed to read fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode extractor payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
