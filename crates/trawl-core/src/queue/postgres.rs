//! PostgreSQL task store (feature `postgres`).
//!
//! - acquire は `FOR UPDATE SKIP LOCKED` の subquery + UPDATE 一文で行う
//! - resolve は「acquired かつ current かつ `visible_at` が token と一致」を WHERE 句に
//!   入れた条件付き UPDATE
//! - pool は明示的に `connect` / `close` する

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use super::{LeaseToken, Resolution, TaskStatus, lease};
use crate::domain::{ExtractionTask, Network, TaskId, TaskKind};
use crate::error::TrawlError;
use crate::observability::TaskStatusCounts;
use crate::ports::{TaskFilter, TaskStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS extraction_task (
    id          TEXT PRIMARY KEY,
    network     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    config      JSONB NOT NULL,
    status      TEXT NOT NULL,
    visible_at  TIMESTAMPTZ NULL,
    error       TEXT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    CONSTRAINT extraction_task_lease_matches_status
        CHECK ((status = 'ACQUIRED') = (visible_at IS NOT NULL)),
    CONSTRAINT extraction_task_error_only_when_failed
        CHECK (error IS NULL OR status = 'FAILED')
);
CREATE INDEX IF NOT EXISTS extraction_task_acquire_idx
    ON extraction_task (network, created_at)
    WHERE status IN ('AVAILABLE', 'ACQUIRED');
"#;

const COLUMNS: &str = "id, network, kind, config, status, visible_at, error, created_at";

const UPSERT: &str = r#"
INSERT INTO extraction_task (id, network, kind, config, status, visible_at, error, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (id) DO UPDATE SET
    network = EXCLUDED.network,
    kind = EXCLUDED.kind,
    config = EXCLUDED.config,
    status = EXCLUDED.status,
    visible_at = EXCLUDED.visible_at,
    error = EXCLUDED.error,
    created_at = EXCLUDED.created_at
"#;

pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, TrawlError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to postgres task store");
        Ok(Self { pool })
    }

    /// Create the table and index if they do not exist.
    pub async fn migrate(&self) -> Result<(), TrawlError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn decode(row: &PgRow) -> Result<ExtractionTask, TrawlError> {
        let id: String = row.try_get("id")?;
        let network: String = row.try_get("network")?;
        let kind: String = row.try_get("kind")?;
        let Json(config): Json<serde_json::Value> = row.try_get("config")?;
        let status: String = row.try_get("status")?;

        ExtractionTask::from_parts(
            id.parse::<TaskId>()
                .map_err(|e| TrawlError::TaskDecode(format!("bad task id {id}: {e}")))?,
            network
                .parse::<Network>()
                .map_err(|e| TrawlError::TaskDecode(e.to_string()))?,
            kind.parse::<TaskKind>()?,
            config,
            status.parse::<TaskStatus>()?,
            row.try_get("visible_at")?,
            row.try_get("error")?,
            row.try_get("created_at")?,
        )
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn upsert(&self, task: ExtractionTask) -> Result<(), TrawlError> {
        self.upsert_many(vec![task]).await
    }

    async fn upsert_many(&self, tasks: Vec<ExtractionTask>) -> Result<(), TrawlError> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            let config = task.config_value()?;
            sqlx::query(UPSERT)
                .bind(task.id.to_string())
                .bind(task.network.as_str())
                .bind(task.kind().as_str())
                .bind(Json(config))
                .bind(task.status.as_str())
                .bind(task.visible_at)
                .bind(task.error.as_deref())
                .bind(task.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<ExtractionTask>, TrawlError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM extraction_task WHERE id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn acquire_next(
        &self,
        network: Network,
        now: DateTime<Utc>,
        lease_duration: TimeDelta,
    ) -> Result<Option<ExtractionTask>, TrawlError> {
        let row = sqlx::query(&format!(
            "UPDATE extraction_task SET status = 'ACQUIRED', visible_at = $3
             WHERE id = (
                SELECT id FROM extraction_task
                WHERE network = $1
                  AND (status = 'AVAILABLE' OR (status = 'ACQUIRED' AND visible_at < $2))
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
             )
             RETURNING {COLUMNS}"
        ))
        .bind(network.as_str())
        .bind(now)
        .bind(now + lease_duration)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn resolve(
        &self,
        id: TaskId,
        token: LeaseToken,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<ExtractionTask, TrawlError> {
        let (status, error) = match resolution {
            Resolution::Completed => (TaskStatus::Completed, None),
            Resolution::Failed(message) => (TaskStatus::Failed, Some(message)),
        };

        let row = sqlx::query(&format!(
            "UPDATE extraction_task SET status = $2, visible_at = NULL, error = $3
             WHERE id = $1 AND status = 'ACQUIRED' AND visible_at > $4 AND visible_at = $5
             RETURNING {COLUMNS}"
        ))
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(token.expires_at())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::decode(&row);
        }

        // 更新されなかった理由を現在の行から判定する
        let current = self
            .find_by_id(id)
            .await?
            .ok_or(TrawlError::TaskNotFound(id))?;
        lease::ensure_resolvable(&current, token, now)?;
        Err(TrawlError::LeaseNotCurrent {
            id,
            status: current.status,
            visible_at: current.visible_at,
        })
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ExtractionTask>, TrawlError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM extraction_task
             WHERE ($1::text IS NULL OR network = $1)
               AND ($2::text IS NULL OR kind = $2)
               AND ($3::text IS NULL OR status = $3)
             ORDER BY created_at, id"
        ))
        .bind(filter.network.map(Network::as_str))
        .bind(filter.kind.map(TaskKind::as_str))
        .bind(filter.status.map(TaskStatus::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn counts(&self) -> Result<TaskStatusCounts, TrawlError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM extraction_task GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = TaskStatusCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            counts.add(status.parse()?, n.max(0) as usize);
        }
        Ok(counts)
    }
}
