use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{HeaderMap, StatusCode};

use super::client_id;
use crate::error::GatewayError;
use crate::models::QuizResponse;
use crate::state::AppState;

// POST /api/quiz - JSON body with a base64 image
pub async fn quiz_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<QuizResponse>, GatewayError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge { max_bytes: state.gateway.max_image_bytes() }
        } else {
            GatewayError::BadRequest(rejection.body_text())
        }
    })?;
    let client = client_id(&headers, peer, state.trust_forwarded_for);

    let analysis = state.gateway.analyze_quiz(&body, &client).await?;
    Ok(Json(QuizResponse::new(analysis)))
}

// POST /api/quiz/upload - multipart form with an `image` or `file` field
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<QuizResponse>, GatewayError> {
    let multipart = multipart.map_err(|rejection| GatewayError::BadRequest(rejection.body_text()))?;
    let client = client_id(&headers, peer, state.trust_forwarded_for);

    let analysis = state.gateway.analyze_upload(multipart, &client).await?;
    Ok(Json(QuizResponse::new(analysis)))
}
