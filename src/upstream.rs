//! OpenAI-compatible chat-completion client for the upstream model.
//!
//! One pooled `reqwest::Client` is shared by every call. Each call carries
//! its own timeout: image analysis gets the long budget, the connectivity
//! probe the short one. Every outcome, including transport errors, comes
//! back as an `AnalysisResult` with the elapsed time attached.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::config::{ApiKey, ConfigError};
use crate::image::ValidImage;
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_LATENCY};
use crate::models::{AnalysisResult, FailureKind, Rejection, UpstreamFailure};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

const EXCERPT_CHARS: usize = 300;
const PROBE_MAX_TOKENS: u32 = 50;
const PROBE_PROMPT: &str = "This is a connectivity test. Reply with a short greeting.";

pub const ANALYSIS_PROMPT: &str = "\
Analyze the quiz question in this image and solve it.

1. Read all text in the image carefully.
2. Identify the question and every answer choice.
3. Reason step by step to find the correct answer.

Reply in this format:
Answer: [choice number] - [choice text]
Question: [the question as read from the image]
Reasoning: [short step-by-step explanation]

If the image does not contain a quiz or the text cannot be read, explain why.";

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: ApiKey,
    pub model: String,
    pub user_agent: String,
    pub analysis_timeout: Duration,
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
    model: String,
    analysis_timeout: Duration,
    probe_timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{COMPLETIONS_PATH}", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            model: config.model,
            analysis_timeout: config.analysis_timeout,
            probe_timeout: config.probe_timeout,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model to answer the quiz shown in `image`.
    pub async fn complete(&self, image: &ValidImage, prompt: &str) -> AnalysisResult {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl { image_url: ImageUrl { url: image.to_data_uri() } },
                ]),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        self.send(&body, self.analysis_timeout).await
    }

    /// Minimal text-only round-trip with the short timeout.
    pub async fn probe(&self) -> AnalysisResult {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: MessageContent::Text(PROBE_PROMPT) }],
            max_tokens: PROBE_MAX_TOKENS,
            temperature: self.temperature,
        };
        self.send(&body, self.probe_timeout).await
    }

    async fn send(&self, body: &ChatRequest<'_>, timeout: Duration) -> AnalysisResult {
        let started = Instant::now();
        let outcome = self.exchange(body, timeout).await;
        let elapsed = started.elapsed();
        UPSTREAM_LATENCY.observe(elapsed.as_secs_f64());
        let elapsed_seconds = round_secs(elapsed);

        match outcome {
            Ok(completion) => {
                tracing::debug!(model = %completion.model, elapsed_seconds, "upstream completion received");
                AnalysisResult::Success {
                    answer: completion.answer,
                    model: completion.model,
                    elapsed_seconds,
                }
            }
            Err(failed) => {
                UPSTREAM_FAILURES.with_label_values(&[failed.kind.label()]).inc();
                log_failure(&failed, elapsed_seconds);
                AnalysisResult::Failure(UpstreamFailure {
                    kind: failed.kind,
                    status: failed.status,
                    excerpt: failed.excerpt,
                    elapsed_seconds,
                })
            }
        }
    }

    async fn exchange(&self, body: &ChatRequest<'_>, timeout: Duration) -> Result<Completion, Failed> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(Failed::transport)?;

        let status = response.status();
        let text = response.text().await.map_err(Failed::transport)?;
        if !status.is_success() {
            return Err(Failed {
                kind: FailureKind::UpstreamRejected(Rejection::from_status(status.as_u16())),
                status: Some(status.as_u16()),
                excerpt: Some(excerpt(&text)),
            });
        }

        parse_completion(&text, &self.model).map_err(|reason| Failed {
            kind: FailureKind::UpstreamProtocolError,
            status: Some(status.as_u16()),
            excerpt: Some(reason),
        })
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) answer: String,
    pub(crate) model: String,
}

struct Failed {
    kind: FailureKind,
    status: Option<u16>,
    excerpt: Option<String>,
}

impl Failed {
    fn transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_decode() {
            FailureKind::UpstreamProtocolError
        } else {
            FailureKind::NetworkError
        };
        Self {
            kind,
            status: err.status().map(|s| s.as_u16()),
            excerpt: Some(err.to_string()),
        }
    }
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

/// Pulls `choices[0].message.content` out of a chat-completion body.
pub(crate) fn parse_completion(json_text: &str, fallback_model: &str) -> Result<Completion, String> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| format!("invalid JSON body: {e}"))?;
    let Some(answer) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    else {
        return Err("missing choices[0].message.content".to_string());
    };
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback_model);
    Ok(Completion { answer: answer.to_string(), model: model.to_string() })
}

pub(crate) fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

fn log_failure(failed: &Failed, elapsed_seconds: f64) {
    let excerpt = failed.excerpt.as_deref().unwrap_or_default();
    match failed.kind {
        FailureKind::UpstreamRejected(Rejection::BadCredentials) => {
            tracing::error!(status = ?failed.status, elapsed_seconds, "upstream rejected the API credentials");
        }
        kind => {
            tracing::warn!(
                kind = kind.label(),
                status = ?failed.status,
                elapsed_seconds,
                excerpt,
                "upstream call failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "upstream_test.rs"]
mod tests;
