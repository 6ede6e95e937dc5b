//! Banner, liveness and status endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;

/// Root banner
#[derive(Serialize)]
pub struct BannerResponse {
    pub message: &'static str,
    pub version: &'static str,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Runtime status of the assistant
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub voice_enabled: bool,
    pub muted: bool,
    pub scheduled_jobs: usize,
}

async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Herald voice assistant API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: if state.status.is_running() {
            "running"
        } else {
            "stopped"
        },
        version: env!("CARGO_PKG_VERSION"),
        voice_enabled: state.status.voice_enabled(),
        muted: state.status.is_muted(),
        scheduled_jobs: state.scheduler.as_ref().map_or(0, |s| s.len()),
    })
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}
