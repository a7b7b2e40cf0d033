use axum::http::header;
use axum::response::IntoResponse;

use crate::error::GatewayError;
use crate::metrics::render;

pub async fn metrics_handler() -> Result<impl IntoResponse, GatewayError> {
    let text = render().map_err(GatewayError::Internal)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}
