//! Bearer-token authentication for the control plane.
//!
//! Every route except `/health` requires `Authorization: Bearer <secret>`
//! matching the configured sandbox secret exactly. Handlers opt in through
//! the [`RequireAuth`] extractor.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The shared secret handed to the server via `SANDBOX_SECRET`.
#[derive(Clone)]
pub struct SharedSecret(Arc<String>);

impl SharedSecret {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(secret.into()))
    }

    fn matches(&self, header: &str) -> bool {
        header.strip_prefix("Bearer ") == Some(self.0.as_str())
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the secret itself.
        f.write_str("SharedSecret(..)")
    }
}

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
    code: String,
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl AuthRejection {
    fn unauthorized(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: AuthErrorResponse {
                success: false,
                error: error.into(),
                code: "UNAUTHORIZED".to_string(),
            },
        }
    }

    fn internal(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: AuthErrorResponse {
                success: false,
                error: error.into(),
                code: "INTERNAL_ERROR".to_string(),
            },
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Axum extractor that requires the sandbox bearer token.
///
/// Extracts `Authorization: Bearer <token>` and compares it against the
/// [`SharedSecret`] provided via request extensions.
pub struct RequireAuth;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let secret = parts
            .extensions
            .get::<SharedSecret>()
            .ok_or_else(|| AuthRejection::internal("Shared secret not configured"))?;

        let header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AuthRejection::unauthorized(
                    "Authentication required. Provide Authorization: Bearer <token>.",
                )
            })?;

        if !secret.matches(header) {
            return Err(AuthRejection::unauthorized("Invalid bearer token"));
        }

        Ok(RequireAuth)
    }
}
