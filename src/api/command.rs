//! Text command endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::command::Command;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub response: String,
}

/// Run a command through the shared pipeline
///
/// The pipeline blocks on network calls, so it runs on the blocking pool.
async fn process_command(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let text = request.command.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("command is empty".to_string()));
    }

    let command = Command::api(text);
    tracing::info!(id = %command.id(), command = %command.text(), "api command");

    let pipeline = Arc::clone(&state.pipeline);
    let response = tokio::task::spawn_blocking(move || pipeline.process_command(command))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "command task failed");
            ApiError::Internal("command processing failed".to_string())
        })?;

    Ok(Json(CommandResponse { response }))
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/command", post(process_command))
        .with_state(state)
}
