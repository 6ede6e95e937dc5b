//! HTTP front-end for herald
//!
//! Serves text commands and job management on its own thread and tokio
//! runtime. Commands go through the same pipeline as voice commands.

pub mod command;
pub mod health;
pub mod schedule;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::command::CommandPipeline;
use crate::config::ApiConfig;
use crate::control::{RuntimeStatus, Subsystem};
use crate::scheduler::SchedulerHandle;
use crate::worker::Worker;
use crate::{Error, Result};

/// How long in-flight requests get after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<dyn CommandPipeline>,
    /// Absent when the scheduler is disabled
    pub scheduler: Option<SchedulerHandle>,
    pub status: Arc<RuntimeStatus>,
}

/// API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(&'static str),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                msg.to_string(),
            ),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody { code, message },
            }),
        )
            .into_response()
    }
}

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router(Arc::clone(&state)))
        .merge(command::router(Arc::clone(&state)))
        .merge(schedule::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// The HTTP server as a lifecycle subsystem
pub struct ApiServer {
    state: ApiState,
    addr: String,
    local_addr: Mutex<Option<SocketAddr>>,
    worker: Mutex<Option<Worker>>,
}

impl ApiServer {
    #[must_use]
    pub fn new(config: &ApiConfig, state: ApiState) -> Self {
        Self {
            state,
            addr: format!("{}:{}", config.host, config.port),
            local_addr: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Bound address once started
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn serve(
    listener: std::net::TcpListener,
    router: Router,
    runtime: tokio::runtime::Runtime,
    cancel: &CancellationToken,
) {
    let shutdown = cancel.clone().cancelled_owned();
    let result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    });

    if let Err(e) = result {
        tracing::error!(error = %e, "API server error");
    }
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

impl Subsystem for ApiServer {
    fn name(&self) -> &'static str {
        "api"
    }

    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        // Bind here so a taken port fails start instead of the worker
        let listener = std::net::TcpListener::bind(&self.addr)
            .map_err(|e| Error::Api(format!("failed to bind {}: {e}", self.addr)))?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("herald-api")
            .enable_all()
            .build()?;

        let app = router(self.state.clone());
        *worker = Some(Worker::spawn(
            "api-server",
            CancellationToken::new(),
            move |cancel| serve(listener, app, runtime, &cancel),
        )?);

        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);
        tracing::info!(addr = %local, "API server listening");
        Ok(())
    }

    fn stop(&self) -> bool {
        let joined = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_none_or(|mut w| w.stop(STOP_TIMEOUT));
        self.local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        joined
    }
}
