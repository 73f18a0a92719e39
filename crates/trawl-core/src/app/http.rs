//! HTTP surface of the queue (axum).
//!
//! | method | path                          | 操作                      |
//! |--------|-------------------------------|---------------------------|
//! | POST   | `/extraction-task/`           | register (1 件 or 配列)   |
//! | POST   | `/extraction-task/acquire`    | acquire_next(network)     |
//! | GET    | `/extraction-task/counts`     | status ごとの件数         |
//! | GET    | `/extraction-task/{id}`       | find                      |
//! | PATCH  | `/extraction-task/{id}`       | COMPLETED / FAILED にする |
//!
//! PATCH は状態だけを変える。結果の保存と fan-out はワーカー側の仕事。
//! body の `visible_at` には acquire で受け取った値をそのまま返す。別の worker が
//! 取り直した task への PATCH は 409 になる。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::service::TaskService;
use crate::domain::{ExtractionTask, Network, TaskConfig, TaskId, TaskKind};
use crate::error::TrawlError;
use crate::observability::TaskStatusCounts;
use crate::queue::{LeaseToken, TaskStatus};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<TrawlError> for ApiError {
    fn from(err: TrawlError) -> Self {
        let status = match &err {
            TrawlError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_state_conflict() => StatusCode::CONFLICT,
            TrawlError::TaskDecode(_)
            | TrawlError::ResultKindMismatch { .. }
            | TrawlError::UnsupportedStatusUpdate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

// ========================================
// Request / response bodies
// ========================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskRequest {
    pub network: Network,
    pub kind: TaskKind,
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NewTasks {
    Many(Vec<NewTaskRequest>),
    One(NewTaskRequest),
}

#[derive(Debug, Deserialize)]
pub struct AcquireRequest {
    pub network: Network,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum AcquireResponse {
    Acquired { task: ExtractionTask },
    NoTaskAvailable,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
    /// lease token
    pub visible_at: LeaseToken,
    #[serde(default)]
    pub error: Option<String>,
}

// ========================================
// Routes
// ========================================

pub fn router(service: Arc<TaskService>) -> Router {
    Router::new()
        .route("/extraction-task/", post(register))
        .route("/extraction-task/acquire", post(acquire))
        .route("/extraction-task/counts", get(counts))
        .route("/extraction-task/{id}", get(find).patch(update_status))
        .with_state(service)
}

async fn register(
    State(service): State<Arc<TaskService>>,
    Json(body): Json<NewTasks>,
) -> ApiResult<(StatusCode, Json<Vec<ExtractionTask>>)> {
    let requests = match body {
        NewTasks::Many(many) => many,
        NewTasks::One(one) => vec![one],
    };
    let configs = requests
        .into_iter()
        .map(|r| Ok((r.network, TaskConfig::from_parts(r.kind, r.config)?)))
        .collect::<Result<Vec<_>, TrawlError>>()?;

    let tasks = service.register_many(configs).await?;
    Ok((StatusCode::CREATED, Json(tasks)))
}

async fn acquire(
    State(service): State<Arc<TaskService>>,
    Json(body): Json<AcquireRequest>,
) -> ApiResult<Json<AcquireResponse>> {
    let response = match service.acquire_next(body.network).await? {
        Some(task) => AcquireResponse::Acquired { task },
        None => AcquireResponse::NoTaskAvailable,
    };
    Ok(Json(response))
}

async fn counts(State(service): State<Arc<TaskService>>) -> ApiResult<Json<TaskStatusCounts>> {
    Ok(Json(service.counts().await?))
}

fn parse_id(raw: &str) -> ApiResult<TaskId> {
    raw.parse()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid task id {raw}: {e}")))
}

async fn find(
    State(service): State<Arc<TaskService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExtractionTask>> {
    let id = parse_id(&id)?;
    let task = service.find(id).await?.ok_or(TrawlError::TaskNotFound(id))?;
    Ok(Json(task))
}

async fn update_status(
    State(service): State<Arc<TaskService>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ExtractionTask>> {
    let id = parse_id(&id)?;
    let task = match body.status {
        TaskStatus::Completed => service.mark_completed(id, body.visible_at).await?,
        TaskStatus::Failed => {
            let message = body.error.unwrap_or_else(|| "failed".to_string());
            service.fail(id, body.visible_at, message).await?
        }
        other => return Err(TrawlError::UnsupportedStatusUpdate(other).into()),
    };
    Ok(Json(task))
}
