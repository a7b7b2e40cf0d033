mod health;
mod metrics;
mod probe;
mod quiz;
mod stats;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use probe::probe_handler;
pub use quiz::{quiz_handler, upload_handler};
pub use stats::stats_handler;

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::state::AppState;

// Slack on top of the base64-expanded image for JSON framing and multipart headers.
const BODY_SLACK_BYTES: usize = 64 * 1024;
// MIME encoders break base64 every 76 chars; a JSON-escaped "\r\n" costs 4 bytes.
const WRAP_LINE_CHARS: usize = 76;
const WRAP_ESCAPED_BYTES: usize = 4;

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = request_body_limit(state.gateway.max_image_bytes());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/test", get(probe_handler))
        .route("/api/test", get(probe_handler))
        .route("/api/quiz", post(quiz_handler))
        .route("/api/quiz/upload", post(upload_handler))
        .route("/api/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(internal_fault))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .with_state(state)
}

/// Largest body accepted for an image of at most `max_image_bytes` once base64
/// encoded, with room for line-wrapped encodings.
pub fn request_body_limit(max_image_bytes: usize) -> usize {
    let encoded = max_image_bytes.div_ceil(3) * 4;
    encoded + encoded.div_ceil(WRAP_LINE_CHARS) * WRAP_ESCAPED_BYTES + BODY_SLACK_BYTES
}

/// Identifies the caller for rate limiting and usage accounting.
pub(crate) fn client_id(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    peer.ip().to_string()
}

fn internal_fault(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(detail, "request handler panicked");
    GatewayError::Internal(detail).into_response()
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": format!("No endpoint at {}", uri.path()),
            "available_endpoints": {
                "health": "GET /health",
                "test": "GET /test",
                "quiz": "POST /api/quiz",
                "upload": "POST /api/quiz/upload",
                "stats": "GET /api/stats",
                "metrics": "GET /metrics",
            },
        })),
    )
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
