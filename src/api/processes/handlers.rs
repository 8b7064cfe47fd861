use std::sync::Arc;

use axum::{
    extract::Query,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use futures_util::{stream, stream::BoxStream, StreamExt};
use serde_json::json;
use tracing::info;

use super::types::{
    KillProcessRequest, KillProcessResponse, ListProcessesResponse, LogsQuery, ProcessSummary,
    StartProcessRequest, StartProcessResponse,
};
use crate::middleware::auth::RequireAuth;
use crate::process::{LogEntry, ProcessManager};

/// Start a supervised background process.
pub async fn start_process(
    _auth: RequireAuth,
    Extension(manager): Extension<Arc<ProcessManager>>,
    Json(req): Json<StartProcessRequest>,
) -> Response {
    if req.cmd.is_empty() {
        return (StatusCode::BAD_REQUEST, "Command is required").into_response();
    }

    match manager.start(&req.cmd, req.cwd.as_deref(), req.env.as_ref()) {
        Ok(process) => {
            info!(id = %process.id(), pid = process.pid(), "process started");
            (
                StatusCode::CREATED,
                Json(StartProcessResponse {
                    id: process.id().to_string(),
                    pid: process.pid(),
                    status: process.status(),
                }),
            )
                .into_response()
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": error.to_string()})),
        )
            .into_response(),
    }
}

/// List all known processes.
pub async fn list_processes(
    _auth: RequireAuth,
    Extension(manager): Extension<Arc<ProcessManager>>,
) -> Json<ListProcessesResponse> {
    let processes = manager
        .list()
        .iter()
        .map(|process| ProcessSummary::from(process.as_ref()))
        .collect();
    Json(ListProcessesResponse { processes })
}

/// Terminate a running process.
pub async fn kill_process(
    _auth: RequireAuth,
    Extension(manager): Extension<Arc<ProcessManager>>,
    Json(req): Json<KillProcessRequest>,
) -> Response {
    if req.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Process ID is required").into_response();
    }

    match manager.kill(&req.id) {
        Ok(()) => {
            info!(id = %req.id, "kill signal delivered");
            Json(KillProcessResponse {
                success: true,
                message: Some("Process killed successfully".to_string()),
                error: None,
            })
            .into_response()
        }
        Err(error) => (
            StatusCode::BAD_REQUEST,
            Json(KillProcessResponse {
                success: false,
                message: None,
                error: Some(error.to_string()),
            }),
        )
            .into_response(),
    }
}

/// Stream a process's historical and live log lines as server-sent events.
///
/// History is delivered first, then live lines until the process terminates;
/// the stream ends with a `complete` event. An unknown id is reported as an
/// in-band `error` event.
pub async fn process_logs_streaming(
    _auth: RequireAuth,
    Extension(manager): Extension<Arc<ProcessManager>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let Some(id) = query.id else {
        return (StatusCode::BAD_REQUEST, "Process ID is required").into_response();
    };

    let stream: BoxStream<'static, Result<Event, axum::Error>> = match manager.subscribe(&id) {
        Ok(rx) => stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|entry| (entry, rx))
        })
        .map(log_event)
        .chain(stream::once(async {
            Event::default()
                .event("complete")
                .json_data(json!({"message": "stream ended"}))
        }))
        .boxed(),
        Err(error) => stream::once(async move {
            Event::default()
                .event("error")
                .json_data(json!({"error": error.to_string()}))
        })
        .boxed(),
    };

    Sse::new(stream).into_response()
}

fn log_event(entry: LogEntry) -> Result<Event, axum::Error> {
    Event::default().event("log").json_data(&entry)
}
