//! One-shot command execution endpoints.
//!
//! `/run` executes a shell command to completion and returns its captured
//! output in one response. `/run_streaming` streams output lines as
//! server-sent events while the command runs, ending with a `complete`
//! event carrying the exit code. Neither variant is tracked by the process
//! supervisor; nothing persists after the request ends.

use std::collections::HashMap;
use std::process::Stdio;

use axum::{
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::warn;

use crate::middleware::auth::RequireAuth;
use crate::process::LogStream;

/// Capacity of the channel feeding the SSE response; full means the command
/// is outpacing the client and the readers apply backpressure.
const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Request body for `/run` and `/run_streaming`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub cmd: String,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
}

/// Response body for `/run`.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub code: i32,
}

/// Build the `sh -c` invocation shared by both endpoints.
fn shell_command(req: &RunRequest) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&req.cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &req.cwd {
        cmd.current_dir(dir);
    }
    if let Some(env) = &req.env {
        cmd.envs(env);
    }
    cmd
}

/// Run a shell command to completion and return its captured output.
async fn run(_auth: RequireAuth, Json(req): Json<RunRequest>) -> Response {
    let child = match shell_command(&req).spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(cmd = %req.cmd, %error, "failed to start command");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start command").into_response();
        }
    };

    let output = match child.wait_with_output().await {
        Ok(output) => output,
        Err(error) => {
            warn!(cmd = %req.cmd, %error, "failed to collect command output");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to collect command output",
            )
                .into_response();
        }
    };

    let code = output.status.code().unwrap_or(-1);
    Json(RunResponse {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        error: (code != 0).then(|| "Non-zero exit code".to_string()),
        code,
    })
    .into_response()
}

/// Events produced while a streamed command runs.
enum CommandEvent {
    Output { stream: LogStream, data: String },
    Complete { code: i32, error: bool },
    Error { error: String },
}

impl CommandEvent {
    fn into_sse(self) -> Result<Event, axum::Error> {
        match self {
            Self::Output { stream, data } => Event::default()
                .event("output")
                .json_data(json!({"stream": stream, "data": data})),
            Self::Complete { code, error } => Event::default()
                .event("complete")
                .json_data(json!({"code": code, "error": error})),
            Self::Error { error } => Event::default()
                .event("error")
                .json_data(json!({"error": error})),
        }
    }
}

/// Run a shell command, streaming its output lines as server-sent events.
async fn run_streaming(
    _auth: RequireAuth,
    Json(req): Json<RunRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(stream_command(req, tx));

    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .map(CommandEvent::into_sse);

    Sse::new(stream)
}

/// Drive a streamed command: spawn, forward both pipes line by line, then
/// emit the completion event once the child is reaped.
async fn stream_command(req: RunRequest, tx: mpsc::Sender<CommandEvent>) {
    let mut child = match shell_command(&req).spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(cmd = %req.cmd, %error, "failed to start command");
            let _ = tx
                .send(CommandEvent::Error {
                    error: "Failed to start command".to_string(),
                })
                .await;
            return;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        let _ = tx
            .send(CommandEvent::Error {
                error: "Failed to get stdout".to_string(),
            })
            .await;
        return;
    };
    let Some(stderr) = child.stderr.take() else {
        let _ = tx
            .send(CommandEvent::Error {
                error: "Failed to get stderr".to_string(),
            })
            .await;
        return;
    };

    let stdout_task = tokio::spawn(forward_lines(stdout, LogStream::Stdout, tx.clone()));
    let stderr_task = tokio::spawn(forward_lines(stderr, LogStream::Stderr, tx.clone()));

    // Both pipes drain before the completion event is sent, so every output
    // event precedes `complete`.
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let (code, error) = match child.wait().await {
        Ok(status) => (status.code().unwrap_or(-1), !status.success()),
        Err(err) => {
            warn!(cmd = %req.cmd, error = %err, "waiting on child failed");
            (-1, true)
        }
    };
    let _ = tx.send(CommandEvent::Complete { code, error }).await;
}

/// Forward one pipe's lines into the event channel.
async fn forward_lines<R>(pipe: R, stream: LogStream, tx: mpsc::Sender<CommandEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx
            .send(CommandEvent::Output { stream, data: line })
            .await
            .is_err()
        {
            break; // client disconnected
        }
    }
}

/// Create command execution routes
pub fn commands_routes() -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/run_streaming", post(run_streaming))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_defaults() {
        let req: RunRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(req.cmd, "");
        assert!(req.cwd.is_none());
        assert!(req.env.is_none());
    }

    #[test]
    fn test_run_request_full() {
        let req: RunRequest = serde_json::from_str(
            r#"{"cmd": "echo hi", "cwd": "/tmp", "env": {"K": "V"}}"#,
        )
        .unwrap();
        assert_eq!(req.cmd, "echo hi");
        assert_eq!(req.cwd.as_deref(), Some("/tmp"));
        assert_eq!(req.env.unwrap().get("K").map(String::as_str), Some("V"));
    }

    #[test]
    fn test_run_response_omits_error_on_success() {
        let json = serde_json::to_string(&RunResponse {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            error: None,
            code: 0,
        })
        .unwrap();
        assert!(json.contains(r#""code":0"#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_run_response_reports_failure() {
        let json = serde_json::to_string(&RunResponse {
            stdout: String::new(),
            stderr: "oops\n".to_string(),
            error: Some("Non-zero exit code".to_string()),
            code: 3,
        })
        .unwrap();
        assert!(json.contains(r#""error":"Non-zero exit code""#));
        assert!(json.contains(r#""code":3"#));
    }
}
