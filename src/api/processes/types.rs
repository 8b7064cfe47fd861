use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::process::{Process, ProcessStatus};

/// Request body for `/start_process`.
#[derive(Debug, Deserialize)]
pub struct StartProcessRequest {
    #[serde(default)]
    pub cmd: String,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
}

/// Response body for `/start_process`.
#[derive(Debug, Serialize)]
pub struct StartProcessResponse {
    pub id: String,
    pub pid: u32,
    pub status: ProcessStatus,
}

/// Minimal process view for list responses.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub id: String,
    pub pid: u32,
    pub status: ProcessStatus,
    pub command: String,
}

impl From<&Process> for ProcessSummary {
    fn from(process: &Process) -> Self {
        Self {
            id: process.id().to_string(),
            pid: process.pid(),
            status: process.status(),
            command: process.command().to_string(),
        }
    }
}

/// Response body for `/list_processes`.
#[derive(Debug, Serialize)]
pub struct ListProcessesResponse {
    pub processes: Vec<ProcessSummary>,
}

/// Request body for `/kill_process`.
#[derive(Debug, Deserialize)]
pub struct KillProcessRequest {
    #[serde(default)]
    pub id: String,
}

/// Outcome body for `/kill_process`.
#[derive(Debug, Serialize)]
pub struct KillProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query parameters for `/process_logs_streaming`.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub id: Option<String>,
}
