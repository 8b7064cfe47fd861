//! Process supervision endpoints.
//!
//! POST /start_process - Start a background process
//! GET /list_processes - List all known processes
//! POST /kill_process - Terminate a running process
//! GET /process_logs_streaming - Stream a process's logs as SSE

pub mod handlers;
pub mod types;


pub use handlers::{kill_process, list_processes, process_logs_streaming, start_process};
pub use types::{
    KillProcessRequest, KillProcessResponse, ListProcessesResponse, LogsQuery, ProcessSummary,
    StartProcessRequest, StartProcessResponse,
};

use axum::{
    routing::{get, post},
    Router,
};

/// Create process supervision routes
pub fn processes_routes() -> Router {
    Router::new()
        .route("/start_process", post(start_process))
        .route("/list_processes", get(list_processes))
        .route("/kill_process", post(kill_process))
        .route("/process_logs_streaming", get(process_logs_streaming))
}
