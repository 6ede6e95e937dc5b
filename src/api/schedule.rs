//! Scheduled job endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::scheduler::{JobInfo, SchedulerHandle};

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub command: String,
    /// Six or seven field cron expression
    pub cron: String,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub success: bool,
    pub message: String,
}

fn scheduler(state: &ApiState) -> Result<&SchedulerHandle, ApiError> {
    state
        .scheduler
        .as_ref()
        .ok_or(ApiError::Unavailable("task scheduler not available"))
}

async fn list_jobs(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<JobInfo>>, ApiError> {
    Ok(Json(scheduler(&state)?.list()))
}

async fn create_job(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let job = scheduler(&state)?
        .add(&request.command, &request.cron)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn delete_job(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    if scheduler(&state)?.remove(id) {
        Ok(Json(ScheduleResponse {
            success: true,
            message: format!("Removed task {id}"),
        }))
    } else {
        Err(ApiError::NotFound(format!("no task with id {id}")))
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/schedule", get(list_jobs).post(create_job))
        .route("/schedule/{id}", delete(delete_job))
        .with_state(state)
}
