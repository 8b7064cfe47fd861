//! Middleware for the sandbox HTTP server.
//!
//! Provides bearer-token authentication via the `RequireAuth` extractor.

pub mod auth;
