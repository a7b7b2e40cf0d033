use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::models::HealthReport;
use crate::state::AppState;

// health handler
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.gateway.health())
}
