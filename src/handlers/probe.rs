use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Map, Value, json};

use super::client_id;
use crate::error::with_retry_after;
use crate::state::AppState;

// GET /test - round-trip to the upstream model
pub async fn probe_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let client = client_id(&headers, peer, state.trust_forwarded_for);

    match state.gateway.connectivity_test(&client).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => {
            let mut body = Map::new();
            body.insert("status".into(), json!("error"));
            body.insert("message".into(), json!(err.public_message()));
            body.extend(err.details());
            body.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

            let response = (err.status(), Json(Value::Object(body))).into_response();
            with_retry_after(&err, response)
        }
    }
}
