//! Test-only helpers: an in-process stand-in for the upstream
//! chat-completion API and ready-made configuration pointing at it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::config::{ApiKey, GatewayOptions};
use crate::rate_limit::RateLimitPolicy;
use crate::upstream::UpstreamConfig;

pub const TEST_API_KEY: &str = "sk-test-key";

#[derive(Clone)]
pub struct StubReply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl StubReply {
    /// 200 with a well-formed completion whose content is `answer`.
    pub fn answer(answer: &str) -> Self {
        let body = json!({
            "id": "chatcmpl-test",
            "model": "stub-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": answer}}],
        });
        Self::raw(StatusCode::OK, &body.to_string())
    }

    pub fn raw(status: StatusCode, body: &str) -> Self {
        Self { status, body: body.to_string(), delay: Duration::ZERO }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct RecordedCall {
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    reply: StubReply,
    hits: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<RecordedCall>>>,
}

pub struct StubUpstream {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<RecordedCall>>>,
}

impl StubUpstream {
    pub async fn spawn(reply: StubReply) -> Self {
        let state = StubState {
            reply,
            hits: Arc::new(AtomicUsize::new(0)),
            last: Arc::new(Mutex::new(None)),
        };
        let hits = Arc::clone(&state.hits);
        let last = Arc::clone(&state.last);

        let app = Router::new()
            .route("/v1/chat/completions", post(stub_completion))
            .layer(DefaultBodyLimit::disable())
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url: format!("http://{addr}"), hits, last }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Runs `inspect` against the most recent request the stub received.
    pub fn with_last<R>(&self, inspect: impl FnOnce(&RecordedCall) -> R) -> R {
        let guard = self.last.lock().unwrap();
        inspect(guard.as_ref().expect("stub upstream was never called"))
    }
}

async fn stub_completion(State(state): State<StubState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    *state.last.lock().unwrap() = Some(RecordedCall { headers, body });

    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }
    (
        state.reply.status,
        [("content-type", "application/json")],
        state.reply.body.clone(),
    )
}

/// An http URL on which nothing is listening.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config(base_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: base_url.to_string(),
        api_key: TEST_API_KEY.parse::<ApiKey>().unwrap(),
        model: "stub-model".to_string(),
        user_agent: "AI-Quiz-Solver/2.0".to_string(),
        analysis_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_secs(2),
        connect_timeout: Duration::from_secs(2),
        max_tokens: 1500,
        temperature: 0.3,
    }
}

pub fn test_options(base_url: &str, quiz_limit: usize) -> GatewayOptions {
    GatewayOptions {
        upstream: test_config(base_url),
        max_image_bytes: 64 * 1024,
        quiz_limit: RateLimitPolicy::new(quiz_limit, Duration::from_secs(300)),
        test_limit: RateLimitPolicy::new(2, Duration::from_secs(300)),
        trust_forwarded_for: false,
    }
}

/// Bytes that pass validation: above the minimum size, PNG signature first.
pub fn sample_image() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend((0..240u32).map(|i| (i % 251) as u8));
    bytes
}

pub fn sample_image_base64() -> String {
    STANDARD.encode(sample_image())
}

pub fn quiz_body() -> Vec<u8> {
    json!({ "image": format!("data:image/png;base64,{}", sample_image_base64()) })
        .to_string()
        .into_bytes()
}
