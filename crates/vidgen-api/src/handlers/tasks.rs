//! Task API handlers.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use vidgen_models::{Task, TaskId, TaskStatus};
use vidgen_store::StatusCounts;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Owner from the `X-Owner-Id` header. Real authentication is a
/// separate concern; absent header means the anonymous owner.
fn owner_id(headers: &HeaderMap) -> String {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub task_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: String,
}

/// POST /api/tasks
pub async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let owner = owner_id(&headers);
    let task = state
        .orchestrator
        .submit(&owner, &req.task_type, &req.params)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: task.id,
            status: "submitted".to_string(),
        }),
    ))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.orchestrator.get(&TaskId::from_string(id)).await?;
    Ok(Json(task))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

/// GET /api/tasks?status=&limit=
pub async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let owner = owner_id(&headers);

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            TaskStatus::parse(s)
                .ok_or_else(|| ApiError::validation(format!("unknown status filter: {s}")))?,
        ),
    };
    let limit = query
        .limit
        .unwrap_or(state.config.list_default_limit)
        .min(state.config.list_max_limit);

    let tasks = state.orchestrator.list(&owner, status, limit).await?;
    let count = tasks.len();
    Ok(Json(ListResponse { tasks, count }))
}

/// POST /api/tasks/:id/cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.orchestrator.cancel(&TaskId::from_string(id)).await?;
    Ok(Json(task))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub days: i64,
    pub counts: StatusCounts,
}

/// GET /api/tasks/stats
pub async fn task_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let owner = owner_id(&headers);
    let days = query.days.unwrap_or(7).clamp(1, 365);
    let counts = state.orchestrator.stats(Some(&owner), days).await?;
    Ok(Json(StatsResponse { days, counts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use vidgen_queue::MemoryTransport;
    use vidgen_store::{MemoryTaskStore, TaskStore};

    use crate::config::ApiConfig;

    fn state() -> AppState {
        AppState::with_components(
            ApiConfig::default(),
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemoryTransport::new()),
        )
    }

    fn headers_for(owner: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-owner-id", owner.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn submit_returns_accepted_with_task_id() {
        let state = state();

        let (status, Json(body)) = submit_task(
            State(state.clone()),
            headers_for("owner-1"),
            Json(SubmitRequest {
                task_type: "frame_extract".to_string(),
                params: json!({"video_path": "uploads/in.mp4"}),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.status, "submitted");

        let task = state.store.get(&body.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.owner_id, "owner-1");
    }

    #[tokio::test]
    async fn submit_without_required_field_is_rejected() {
        let state = state();

        let err = submit_task(
            State(state.clone()),
            headers_for("owner-1"),
            Json(SubmitRequest {
                task_type: "veo_generate".to_string(),
                params: json!({"prompt": "a boat"}),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::Validation(_)));
        let listed = state.store.list("owner-1", None, 10).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn list_rejects_bad_status_filter() {
        let state = state();
        let err = list_tasks(
            State(state),
            headers_for("owner-1"),
            Query(ListQuery {
                status: Some("sleeping".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn list_scopes_to_owner_header() {
        let state = state();

        for owner in ["owner-1", "owner-1", "owner-2"] {
            submit_task(
                State(state.clone()),
                headers_for(owner),
                Json(SubmitRequest {
                    task_type: "frame_extract".to_string(),
                    params: json!({"video_path": "uploads/in.mp4"}),
                }),
            )
            .await
            .unwrap();
        }

        let Json(body) = list_tasks(
            State(state),
            headers_for("owner-1"),
            Query(ListQuery {
                status: Some("pending".to_string()),
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.count, 2);
        assert!(body.tasks.iter().all(|t| t.owner_id == "owner-1"));
    }

    #[tokio::test]
    async fn get_unknown_task_is_not_found() {
        let state = state();
        let err = get_task(State(state), Path("no-such-task".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
