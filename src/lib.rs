//! In-container sandbox executor.
//!
//! An authenticated HTTP control plane for one-shot command execution,
//! supervised background processes with live log streaming, and elementary
//! filesystem operations, plus a raw TCP data plane whose forward target can
//! be rebound at runtime.

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod middleware;
pub mod process;
pub mod proxy;
pub mod server;
