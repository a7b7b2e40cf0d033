use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: CounterVec = register_counter_vec!(
        "quiz_gateway_requests_total",
        "Requests received, by endpoint",
        &["endpoint"]
    )
    .unwrap();
    pub static ref RATE_LIMITED_TOTAL: CounterVec = register_counter_vec!(
        "quiz_gateway_rate_limited_total",
        "Requests rejected by the local rate limiter, by endpoint",
        &["endpoint"]
    )
    .unwrap();
    pub static ref INVALID_INPUT_TOTAL: Counter =
        register_counter!("quiz_gateway_invalid_input_total", "Requests rejected as bad input").unwrap();
    pub static ref UPSTREAM_FAILURES: CounterVec = register_counter_vec!(
        "quiz_gateway_upstream_failures_total",
        "Upstream calls that did not succeed, by failure kind",
        &["kind"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "quiz_gateway_upstream_latency_seconds",
        "Upstream call latency in seconds",
        vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0]
    )
    .unwrap();
    pub static ref RATE_LIMIT_WINDOWS: Gauge =
        register_gauge!("quiz_gateway_rate_limit_windows", "Rate-limit windows currently held").unwrap();
}

/// Prometheus text exposition of the default registry.
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
