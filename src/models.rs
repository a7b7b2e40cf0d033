use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::image::ValidImage;

// Body of POST /api/quiz. Older clients send `base64` instead of `image`.
#[derive(Deserialize, Debug, Default)]
pub struct QuizRequest {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

impl QuizRequest {
    /// The first non-blank image field, `image` taking precedence.
    pub fn payload(&self) -> Option<&str> {
        [self.image.as_deref(), self.base64.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

// One validated analysis, owned by a single in-flight call
pub struct AnalysisRequest {
    pub request_id: String,
    pub client_id: String,
    pub image: ValidImage,
    pub received_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(client_id: &str, image: ValidImage) -> Self {
        let received_at = Utc::now();
        Self {
            request_id: make_request_id(client_id, received_at),
            client_id: client_id.to_string(),
            image,
            received_at,
        }
    }
}

// Request id: `quiz_<unix seconds>_<8 hex chars of sha256(client + arrival)>`
pub fn make_request_id(client_id: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("quiz_{}_{}", at.timestamp(), &digest[..8])
}

/// Outcome of one upstream call.
#[derive(Debug, Clone)]
pub enum AnalysisResult {
    Success {
        answer: String,
        model: String,
        elapsed_seconds: f64,
    },
    Failure(UpstreamFailure),
}

#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    /// Truncated upstream body or transport error, for logs only.
    pub excerpt: Option<String>,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    NetworkError,
    UpstreamProtocolError,
    UpstreamRejected(Rejection),
}

// Non-2xx statuses the upstream is known to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BadCredentials,
    PayloadTooLarge,
    RateLimited,
    ServerError,
    Unavailable,
    Other(u16),
}

impl Rejection {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::BadCredentials,
            413 => Self::PayloadTooLarge,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            503 => Self::Unavailable,
            other => Self::Other(other),
        }
    }
}

impl FailureKind {
    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network",
            Self::UpstreamProtocolError => "protocol",
            Self::UpstreamRejected(Rejection::BadCredentials) => "rejected_credentials",
            Self::UpstreamRejected(Rejection::PayloadTooLarge) => "rejected_too_large",
            Self::UpstreamRejected(Rejection::RateLimited) => "rejected_rate_limited",
            Self::UpstreamRejected(Rejection::ServerError) => "rejected_server_error",
            Self::UpstreamRejected(Rejection::Unavailable) => "rejected_unavailable",
            Self::UpstreamRejected(Rejection::Other(_)) => "rejected_other",
        }
    }

    pub fn message(self) -> String {
        let text = match self {
            Self::Timeout => "The AI service did not respond in time.",
            Self::NetworkError => "Could not reach the AI service.",
            Self::UpstreamProtocolError => "The AI service returned an unexpected response.",
            Self::UpstreamRejected(Rejection::BadCredentials) => {
                "The AI service rejected the gateway's credentials."
            }
            Self::UpstreamRejected(Rejection::PayloadTooLarge) => {
                "The AI service rejected the image as too large."
            }
            Self::UpstreamRejected(Rejection::RateLimited) => {
                "The AI service is rate limiting this gateway right now."
            }
            Self::UpstreamRejected(Rejection::ServerError) => "The AI service had an internal error.",
            Self::UpstreamRejected(Rejection::Unavailable) => "The AI service is temporarily unavailable.",
            Self::UpstreamRejected(Rejection::Other(code)) => {
                return format!("The AI service returned an unexpected error (status {code}).");
            }
        };
        text.to_string()
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Timeout => "Reduce the image size or check your connection, then try again.",
            Self::NetworkError => "Check your connection and try again.",
            Self::UpstreamRejected(Rejection::BadCredentials) => {
                "The service is misconfigured; please contact the administrator."
            }
            Self::UpstreamRejected(Rejection::PayloadTooLarge) => "Reduce the image size and try again.",
            Self::UpstreamRejected(Rejection::RateLimited) => "Wait a minute before trying again.",
            Self::UpstreamProtocolError
            | Self::UpstreamRejected(Rejection::ServerError | Rejection::Unavailable | Rejection::Other(_)) => {
                "Try again shortly; contact the administrator if the problem persists."
            }
        }
    }
}

// Successful analysis, rendered inside QuizResponse
#[derive(Serialize, Debug, Clone)]
pub struct Analysis {
    pub answer: String,
    pub processing_time: f64,
    pub model: String,
    pub timestamp: String,
    pub request_id: String,
    pub image_size_kb: f64,
}

#[derive(Serialize, Debug)]
pub struct QuizResponse {
    pub success: bool,
    pub message: &'static str,
    pub analysis: Analysis,
}

impl QuizResponse {
    pub fn new(analysis: Analysis) -> Self {
        Self { success: true, message: "Quiz analysis complete.", analysis }
    }
}

// Result of the GET /test connectivity round-trip
#[derive(Serialize, Debug, Clone)]
pub struct ProbeReport {
    pub status: &'static str,
    pub message: &'static str,
    pub ai_response: String,
    pub response_time: f64,
    pub model: String,
    pub timestamp: String,
}

#[derive(Serialize, Debug)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub version: &'static str,
}

#[derive(Serialize, Debug)]
pub struct StatsReport {
    pub total_requests: u64,
    pub started_at: String,
    pub uptime_seconds: f64,
    pub uptime_formatted: String,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    /// Distinct clients seen since startup. Addresses themselves are not exposed.
    pub unique_clients: usize,
    /// Clients currently holding a rate-limit window.
    pub active_clients: usize,
    pub server_time: String,
    pub version: &'static str,
    pub api_info: ApiInfo,
}

#[derive(Serialize, Debug)]
pub struct ApiInfo {
    pub model: String,
    pub max_image_bytes: usize,
    pub rate_limit: String,
    pub test_rate_limit: String,
    pub supported_formats: [&'static str; 5],
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
