//! Error types for process supervision.

use thiserror::Error;

use super::manager::ProcessStatus;

/// Process supervision error type
#[derive(Debug, Error)]
pub enum Error {
    /// Spawning the child process failed
    #[error("failed to start command: {0}")]
    Spawn(String),

    /// No process registered under the given id
    #[error("process not found: {0}")]
    NotFound(String),

    /// Kill requested for a process that is no longer running
    #[error("process is not running (status: {0})")]
    NotRunning(ProcessStatus),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
