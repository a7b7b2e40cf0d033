use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::image::{EXTENDED_MAX_IMAGE_BYTES, STANDARD_MAX_IMAGE_BYTES};
use crate::rate_limit::{DEFAULT_QUIZ_LIMIT, DEFAULT_TEST_LIMIT, DEFAULT_WINDOW_SECS, RateLimitPolicy};
use crate::upstream::{DEFAULT_BASE_URL, DEFAULT_MODEL, UpstreamConfig};

// CLI argument structure; every option can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "quiz-gateway")]
#[command(about = "Rate-limited gateway that forwards quiz images to a multimodal chat-completion API")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "QUIZ_GATEWAY_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    // Port to run the server on
    #[arg(short, long, env = "QUIZ_GATEWAY_PORT", default_value_t = 8080)]
    pub port: u16,

    // Upstream API base URL (the chat-completions path is appended)
    #[arg(long, env = "UPSTREAM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub upstream_url: String,

    // Bearer token for the upstream API. Required, there is no default.
    #[arg(long, env = "UPSTREAM_API_KEY", hide_env_values = true)]
    pub api_key: ApiKey,

    #[arg(long, env = "UPSTREAM_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "UPSTREAM_MAX_TOKENS", default_value_t = 1500)]
    pub max_tokens: u32,

    #[arg(long, env = "UPSTREAM_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    // Seconds allowed for an image analysis call
    #[arg(long, env = "UPSTREAM_ANALYSIS_TIMEOUT", default_value_t = 60)]
    pub analysis_timeout: u64,

    // Seconds allowed for the /test connectivity call
    #[arg(long, env = "UPSTREAM_TEST_TIMEOUT", default_value_t = 10)]
    pub test_timeout: u64,

    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    // Sent as User-Agent so the upstream can tell our traffic apart
    #[arg(long, env = "UPSTREAM_USER_AGENT", default_value = "AI-Quiz-Solver/2.0")]
    pub user_agent: String,

    // Upload size profile: standard = 5 MiB, extended = 10 MiB
    #[arg(long, value_enum, env = "QUIZ_GATEWAY_IMAGE_PROFILE", default_value_t = ImageProfile::Standard)]
    pub image_profile: ImageProfile,

    // Explicit decoded-size limit in bytes, overrides the profile
    #[arg(long, env = "QUIZ_GATEWAY_MAX_IMAGE_BYTES")]
    pub max_image_bytes: Option<usize>,

    // Quiz requests allowed per client per window
    #[arg(long, env = "QUIZ_GATEWAY_RATE_LIMIT", default_value_t = DEFAULT_QUIZ_LIMIT)]
    pub rate_limit: usize,

    // Connectivity tests allowed per client per window
    #[arg(long, env = "QUIZ_GATEWAY_TEST_RATE_LIMIT", default_value_t = DEFAULT_TEST_LIMIT)]
    pub test_rate_limit: usize,

    // Rate limit window in seconds
    #[arg(long, env = "QUIZ_GATEWAY_RATE_WINDOW", default_value_t = DEFAULT_WINDOW_SECS)]
    pub rate_window: u64,

    // Identify clients by the first X-Forwarded-For hop (only behind a trusted proxy)
    #[arg(long, env = "QUIZ_GATEWAY_TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    // Idle rate-limit window eviction interval in seconds
    #[arg(long, env = "QUIZ_GATEWAY_CLEANUP_INTERVAL", default_value_t = 60)]
    pub cleanup_interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageProfile {
    Standard,
    Extended,
}

impl ImageProfile {
    pub fn max_bytes(self) -> usize {
        match self {
            Self::Standard => STANDARD_MAX_IMAGE_BYTES,
            Self::Extended => EXTENDED_MAX_IMAGE_BYTES,
        }
    }
}

/// Upstream bearer token. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for ApiKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("upstream API key is empty; set UPSTREAM_API_KEY")]
    MissingApiKey,
    #[error("invalid upstream URL '{0}': expected http:// or https://")]
    InvalidUpstreamUrl(String),
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
    #[error("HTTP client build failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Everything the gateway needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub upstream: UpstreamConfig,
    pub max_image_bytes: usize,
    pub quiz_limit: RateLimitPolicy,
    pub test_limit: RateLimitPolicy,
    pub trust_forwarded_for: bool,
}

impl Args {
    pub fn gateway_options(&self) -> Result<GatewayOptions, ConfigError> {
        if self.api_key.expose().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let url = self.upstream_url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUpstreamUrl(self.upstream_url.clone()));
        }

        let checks = [
            ("rate-limit", self.rate_limit as u64),
            ("test-rate-limit", self.test_rate_limit as u64),
            ("rate-window", self.rate_window),
            ("analysis-timeout", self.analysis_timeout),
            ("test-timeout", self.test_timeout),
            ("connect-timeout", self.connect_timeout),
            ("max-image-bytes", self.max_image_bytes.unwrap_or(1) as u64),
        ];
        if let Some(&(name, _)) = checks.iter().find(|&&(_, v)| v == 0) {
            return Err(ConfigError::Zero { name });
        }

        let window = Duration::from_secs(self.rate_window);
        Ok(GatewayOptions {
            upstream: UpstreamConfig {
                base_url: url.to_string(),
                api_key: self.api_key.clone(),
                model: self.model.clone(),
                user_agent: self.user_agent.clone(),
                analysis_timeout: Duration::from_secs(self.analysis_timeout),
                probe_timeout: Duration::from_secs(self.test_timeout),
                connect_timeout: Duration::from_secs(self.connect_timeout),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            max_image_bytes: self.max_image_bytes.unwrap_or(self.image_profile.max_bytes()),
            quiz_limit: RateLimitPolicy::new(self.rate_limit, window),
            test_limit: RateLimitPolicy::new(self.test_rate_limit, window),
            trust_forwarded_for: self.trust_forwarded_for,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
