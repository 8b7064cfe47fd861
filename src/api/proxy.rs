//! TCP proxy control endpoints.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::middleware::auth::RequireAuth;
use crate::proxy::ProxyController;

/// Request body for `/bind_port`.
#[derive(Debug, Deserialize)]
pub struct BindPortRequest {
    #[serde(default)]
    pub port: String,
}

/// Point the proxy at an internal port.
///
/// At most one binding is active at a time; a second bind is a conflict
/// reporting the current port.
async fn bind_port(
    _auth: RequireAuth,
    Extension(proxy): Extension<Arc<ProxyController>>,
    Json(req): Json<BindPortRequest>,
) -> Response {
    if req.port.is_empty() {
        return (StatusCode::BAD_REQUEST, "Port is required").into_response();
    }

    match proxy.bind(req.port.clone()) {
        Ok(()) => {
            info!(port = %req.port, "proxy target bound");
            Json(json!({
                "success": true,
                "message": "Port binding configured",
                "port": req.port,
            }))
            .into_response()
        }
        Err(conflict) => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "Port already bound",
                "current_port": conflict.current_port,
            })),
        )
            .into_response(),
    }
}

/// Clear the proxy target. Idempotent.
async fn unbind_port(
    _auth: RequireAuth,
    Extension(proxy): Extension<Arc<ProxyController>>,
) -> Json<serde_json::Value> {
    proxy.unbind();
    info!("proxy target unbound");
    Json(json!({
        "success": true,
        "message": "Port binding removed",
    }))
}

/// Create proxy control routes
pub fn proxy_routes() -> Router {
    Router::new()
        .route("/bind_port", post(bind_port))
        .route("/unbind_port", post(unbind_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_request_defaults_to_empty() {
        let req: BindPortRequest = serde_json::from_str(r#"{}"#).unwrap();
        assert!(req.port.is_empty());
    }

    #[test]
    fn test_bind_request_deserialization() {
        let req: BindPortRequest = serde_json::from_str(r#"{"port": "9000"}"#).unwrap();
        assert_eq!(req.port, "9000");
    }
}
