//! Gateway error taxonomy.
//!
//! Every way a request can end badly maps to one variant, and each variant
//! knows its HTTP status and the message the caller is allowed to see.
//! Internal detail (upstream bodies, panic payloads) stays in the logs.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::image::ImageError;
use crate::models::{FailureKind, Rejection, UpstreamFailure};
use crate::rate_limit::RateLimited;

const INTERNAL_MESSAGE: &str = "An internal server error occurred. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed JSON, missing image field, unreadable multipart body.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    /// The request body exceeded the configured limit before it was parsed.
    #[error("request body too large (maximum {max_bytes} bytes)")]
    PayloadTooLarge { max_bytes: usize },

    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error("upstream failure: {}", .0.kind.message())]
    Upstream(UpstreamFailure),

    #[error("internal fault: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidImage(ImageError::TooLarge { .. }) | Self::PayloadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::InvalidImage(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(failure) => upstream_status(failure.kind),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::RateLimited(limited) => format!(
                "Too many requests: at most {} requests per {} seconds. Try again in {} seconds.",
                limited.limit, limited.window_secs, limited.retry_after_secs
            ),
            Self::Upstream(failure) => failure.kind.message(),
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Extra response fields beyond `message`.
    pub fn details(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        match self {
            Self::RateLimited(limited) => {
                extra.insert("retry_after".into(), json!(limited.retry_after_secs));
            }
            Self::Upstream(failure) => {
                if let Some(status) = failure.status {
                    extra.insert("error_code".into(), json!(status));
                }
                extra.insert("suggestion".into(), json!(failure.kind.suggestion()));
                extra.insert("processing_time".into(), json!(failure.elapsed_seconds));
            }
            Self::InvalidImage(ImageError::TooLarge { .. }) | Self::PayloadTooLarge { .. } => {
                extra.insert("suggestion".into(), json!("Reduce the image size and try again."));
            }
            _ => {}
        }
        extra
    }

    /// `{"success": false, "message": ...}` plus any details.
    pub fn failure_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("success".into(), json!(false));
        body.insert("message".into(), json!(self.public_message()));
        body.extend(self.details());
        Value::Object(body)
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited(limited) => Some(limited.retry_after_secs),
            _ => None,
        }
    }
}

/// HTTP status returned to the caller for an upstream failure.
pub fn upstream_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::NetworkError | FailureKind::UpstreamRejected(Rejection::Unavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        FailureKind::UpstreamRejected(Rejection::PayloadTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
        FailureKind::UpstreamRejected(Rejection::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        FailureKind::UpstreamProtocolError
        | FailureKind::UpstreamRejected(Rejection::BadCredentials | Rejection::ServerError | Rejection::Other(_)) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Attaches `Retry-After` when the error carries one.
pub fn with_retry_after(err: &GatewayError, mut response: Response) -> Response {
    if let Some(secs) = err.retry_after() {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let response = (self.status(), Json(self.failure_body())).into_response();
        with_retry_after(&self, response)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
