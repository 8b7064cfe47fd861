//! Filesystem operation endpoints.
//!
//! Each endpoint wraps a single filesystem primitive. Failures are reported
//! in-band as `{success:false, error}` (or `{error}`) with a 200 status.

use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::middleware::auth::RequireAuth;

/// Request body for `/write_file`.
#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

/// Request body for the path-only operations.
#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

/// Outcome body for the mutating operations.
#[derive(Debug, Serialize)]
pub struct OpResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResponse {
    fn from_result(result: std::io::Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(error) => Self {
                success: false,
                error: Some(error.to_string()),
            },
        }
    }
}

/// Response body for `/read_file`.
#[derive(Debug, Serialize)]
pub struct ReadFileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for `/list_dir`.
#[derive(Debug, Serialize)]
pub struct ListDirResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn write_file(_auth: RequireAuth, Json(req): Json<WriteFileRequest>) -> Json<OpResponse> {
    Json(OpResponse::from_result(
        write_with_mode(&req.path, &req.content).await,
    ))
}

async fn write_with_mode(path: &str, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

async fn read_file(_auth: RequireAuth, Json(req): Json<PathRequest>) -> Json<ReadFileResponse> {
    match fs::read_to_string(&req.path).await {
        Ok(content) => Json(ReadFileResponse {
            content: Some(content),
            error: None,
        }),
        Err(error) => Json(ReadFileResponse {
            content: None,
            error: Some(error.to_string()),
        }),
    }
}

async fn delete_file(_auth: RequireAuth, Json(req): Json<PathRequest>) -> Json<OpResponse> {
    Json(OpResponse::from_result(fs::remove_file(&req.path).await))
}

/// Recursive removal, like `rm -rf`.
async fn delete_dir(_auth: RequireAuth, Json(req): Json<PathRequest>) -> Json<OpResponse> {
    Json(OpResponse::from_result(fs::remove_dir_all(&req.path).await))
}

async fn make_dir(_auth: RequireAuth, Json(req): Json<PathRequest>) -> Json<OpResponse> {
    Json(OpResponse::from_result(
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&req.path)
            .await,
    ))
}

async fn list_dir(_auth: RequireAuth, Json(req): Json<PathRequest>) -> Json<ListDirResponse> {
    match read_entries(&req.path).await {
        Ok(entries) => Json(ListDirResponse {
            entries: Some(entries),
            error: None,
        }),
        Err(error) => Json(ListDirResponse {
            entries: None,
            error: Some(error.to_string()),
        }),
    }
}

/// Entry names only; iteration order is whatever the OS returns.
async fn read_entries(path: &str) -> std::io::Result<Vec<String>> {
    let mut dir = fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(entries)
}

/// Create filesystem operation routes
pub fn files_routes() -> Router {
    Router::new()
        .route("/write_file", post(write_file))
        .route("/read_file", post(read_file))
        .route("/delete_file", post(delete_file))
        .route("/delete_dir", post(delete_dir))
        .route("/make_dir", post(make_dir))
        .route("/list_dir", post(list_dir))
}
