//! Gateway Handlers
//!
//! HTTP handlers for starting runs, injecting input and inspecting sessions.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};

use super::routes::AppState;
use crate::engine::RunRequest;
use crate::error::RunnerError;
use crate::session::SessionInfo;

/// Inject input request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub compiler: Option<String>,
}

/// JSON error body returned by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// Runner error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub RunnerError);

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            RunnerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RunnerError::ProcessAlreadyTerminated(_) => StatusCode::CONFLICT,
            RunnerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RunnerError::TooManySessions(_) => StatusCode::TOO_MANY_REQUESTS,
            RunnerError::CompilerNotFound => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Start a run and stream its events.
///
/// POST /api/run
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.start(request);

    let stream = ReceiverStream::new(rx).map(|event| {
        let sse = match serde_json::to_string(&event) {
            Ok(json) => Event::default().data(json),
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.kind(), e);
                Event::default()
                    .data(r#"{"type":"error","error":"serialization failed","code":"runtime_error"}"#)
            }
        };
        Ok(sse)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// Write a line into a running program.
///
/// POST /api/run/input
pub async fn send_input(
    State(state): State<AppState>,
    Json(request): Json<InputRequest>,
) -> Result<Json<InputResponse>, ApiError> {
    state
        .engine
        .sessions()
        .send_input(&request.session_id, &request.text)
        .await?;
    Ok(Json(InputResponse { success: true }))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.engine.sessions().list_sessions())
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let compiler = state.engine.locator().locate().await.map(|t| t.name);
    Json(HealthResponse {
        status: "ok".to_string(),
        compiler,
    })
}
