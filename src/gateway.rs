//! Request gateway: admission, validation, accounting and the upstream call.
//!
//! Every analysis follows the same path. The client is admitted against its
//! rate-limit window, the payload is validated, usage is recorded, and only
//! then is the upstream called. Nothing here holds a lock across the
//! upstream await.

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use chrono::Utc;

use crate::config::{ConfigError, GatewayOptions};
use crate::error::GatewayError;
use crate::image::{ALLOWED_MIME_TYPES, ImagePayload, ImageValidator, ValidImage};
use crate::metrics::{INVALID_INPUT_TOTAL, RATE_LIMITED_TOTAL, REQUEST_TOTAL, RATE_LIMIT_WINDOWS};
use crate::models::{
    Analysis, AnalysisRequest, AnalysisResult, ApiInfo, HealthReport, ProbeReport, QuizRequest, StatsReport,
};
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::upstream::{ANALYSIS_PROMPT, UpstreamClient};
use crate::usage::{CounterKey, UsageRecorder, format_uptime};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const QUIZ: &str = "quiz";
const TEST: &str = "test";
const UPLOAD_FIELDS: [&str; 2] = ["image", "file"];

pub struct Gateway {
    quiz_limiter: RateLimiter,
    test_limiter: RateLimiter,
    usage: UsageRecorder,
    upstream: UpstreamClient,
    validator: ImageValidator,
}

impl Gateway {
    pub fn new(options: &GatewayOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            quiz_limiter: RateLimiter::new(options.quiz_limit),
            test_limiter: RateLimiter::new(options.test_limit),
            usage: UsageRecorder::new(),
            upstream: UpstreamClient::new(options.upstream.clone())?,
            validator: ImageValidator::new(options.max_image_bytes),
        })
    }

    pub fn usage(&self) -> &UsageRecorder {
        &self.usage
    }

    pub fn max_image_bytes(&self) -> usize {
        self.validator.max_bytes()
    }

    /// Analyze a JSON body of the form `{"image": "<base64>"}`.
    pub async fn analyze_quiz(&self, body: &[u8], client_id: &str) -> Result<Analysis, GatewayError> {
        REQUEST_TOTAL.with_label_values(&[QUIZ]).inc();
        self.admit(&self.quiz_limiter, QUIZ, client_id)?;

        let request: QuizRequest = serde_json::from_slice(body)
            .map_err(|e| rejected_input(GatewayError::BadRequest(format!("request body is not valid JSON: {e}"))))?;
        let Some(raw) = request.payload() else {
            return Err(rejected_input(GatewayError::BadRequest(
                "no image data provided; send it in the 'image' field".to_string(),
            )));
        };
        let image = self
            .validator
            .validate(ImagePayload::Encoded(raw))
            .map_err(|e| rejected_input(e.into()))?;

        self.run_analysis(client_id, image).await
    }

    /// Analyze the first `image` or `file` field of a multipart upload.
    pub async fn analyze_upload(&self, mut multipart: Multipart, client_id: &str) -> Result<Analysis, GatewayError> {
        REQUEST_TOTAL.with_label_values(&[QUIZ]).inc();
        self.admit(&self.quiz_limiter, QUIZ, client_id)?;

        let max_bytes = self.validator.max_bytes();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| rejected_input(multipart_error(e, max_bytes)))?
        {
            if !field.name().is_some_and(|name| UPLOAD_FIELDS.contains(&name)) {
                continue;
            }
            let content_type = field.content_type().map(str::to_owned);
            let file_name = field.file_name().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| rejected_input(multipart_error(e, max_bytes)))?;

            let image = self
                .validator
                .validate(ImagePayload::Binary {
                    bytes: bytes.to_vec(),
                    content_type: content_type.as_deref(),
                    file_name: file_name.as_deref(),
                })
                .map_err(|e| rejected_input(e.into()))?;
            return self.run_analysis(client_id, image).await;
        }

        Err(rejected_input(GatewayError::BadRequest(
            "no file uploaded; send the image in an 'image' or 'file' field".to_string(),
        )))
    }

    /// Minimal round-trip to the upstream under the stricter test limit.
    pub async fn connectivity_test(&self, client_id: &str) -> Result<ProbeReport, GatewayError> {
        REQUEST_TOTAL.with_label_values(&[TEST]).inc();
        self.admit(&self.test_limiter, TEST, client_id)?;

        self.usage.record(CounterKey::Total);
        self.usage.record(CounterKey::Endpoint(TEST));

        match self.upstream.probe().await {
            AnalysisResult::Success { answer, model, elapsed_seconds } => {
                tracing::info!(client_id, elapsed_seconds, "connectivity test passed");
                Ok(ProbeReport {
                    status: "success",
                    message: "Connection to the AI service is working.",
                    ai_response: answer,
                    response_time: elapsed_seconds,
                    model,
                    timestamp: Utc::now().to_rfc3339(),
                })
            }
            AnalysisResult::Failure(failure) => Err(GatewayError::Upstream(failure)),
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339(),
            uptime_seconds: self.usage.uptime().as_secs_f64(),
            version: VERSION,
        }
    }

    pub fn stats(&self) -> StatsReport {
        let snapshot = self.usage.snapshot();
        StatsReport {
            total_requests: snapshot.total,
            started_at: snapshot.started_at.to_rfc3339(),
            uptime_seconds: snapshot.uptime.as_secs_f64(),
            uptime_formatted: format_uptime(snapshot.uptime),
            requests_by_endpoint: snapshot.by_endpoint,
            unique_clients: snapshot.by_client.len(),
            active_clients: self.quiz_limiter.tracked_clients(),
            server_time: Utc::now().to_rfc3339(),
            version: VERSION,
            api_info: ApiInfo {
                model: self.upstream.model().to_string(),
                max_image_bytes: self.validator.max_bytes(),
                rate_limit: describe_policy(self.quiz_limiter.policy()),
                test_rate_limit: describe_policy(self.test_limiter.policy()),
                supported_formats: ALLOWED_MIME_TYPES,
            },
        }
    }

    /// Drops rate-limit windows with no recent requests. Returns how many went.
    pub fn evict_idle_clients(&self) -> usize {
        let evicted = self.quiz_limiter.evict_idle() + self.test_limiter.evict_idle();
        self.refresh_window_gauge();
        evicted
    }

    async fn run_analysis(&self, client_id: &str, image: ValidImage) -> Result<Analysis, GatewayError> {
        let request = AnalysisRequest::new(client_id, image);

        self.usage.record(CounterKey::Total);
        self.usage.record(CounterKey::Endpoint(QUIZ));
        self.usage.record(CounterKey::Client(request.client_id.clone()));

        let image_size_kb = request.image.size_kb();
        tracing::info!(
            request_id = %request.request_id,
            client_id,
            received_at = %request.received_at.to_rfc3339(),
            image_size_kb,
            mime = request.image.mime_or_default(),
            "forwarding quiz image"
        );

        match self.upstream.complete(&request.image, ANALYSIS_PROMPT).await {
            AnalysisResult::Success { answer, model, elapsed_seconds } => {
                tracing::info!(request_id = %request.request_id, elapsed_seconds, "quiz analysis complete");
                Ok(Analysis {
                    answer,
                    processing_time: elapsed_seconds,
                    model,
                    timestamp: Utc::now().to_rfc3339(),
                    request_id: request.request_id,
                    image_size_kb,
                })
            }
            AnalysisResult::Failure(failure) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    kind = failure.kind.label(),
                    elapsed_seconds = failure.elapsed_seconds,
                    "quiz analysis failed"
                );
                Err(GatewayError::Upstream(failure))
            }
        }
    }

    fn admit(&self, limiter: &RateLimiter, endpoint: &'static str, client_id: &str) -> Result<(), GatewayError> {
        let verdict = limiter.admit(client_id);
        self.refresh_window_gauge();
        verdict.map_err(|limited| {
            RATE_LIMITED_TOTAL.with_label_values(&[endpoint]).inc();
            tracing::warn!(client_id, endpoint, retry_after = limited.retry_after_secs, "rate limit exceeded");
            GatewayError::from(limited)
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn refresh_window_gauge(&self) {
        RATE_LIMIT_WINDOWS.set((self.quiz_limiter.tracked_clients() + self.test_limiter.tracked_clients()) as f64);
    }
}

fn rejected_input(err: GatewayError) -> GatewayError {
    INVALID_INPUT_TOTAL.inc();
    tracing::info!(status = err.status().as_u16(), reason = %err, "rejected request input");
    err
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge { max_bytes }
    } else {
        GatewayError::BadRequest(format!("could not read the upload: {}", err.body_text()))
    }
}

fn describe_policy(policy: RateLimitPolicy) -> String {
    format!("{} requests per {} seconds", policy.max_requests, policy.window.as_secs())
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
