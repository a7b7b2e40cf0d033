use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use crate::models::StatsReport;
use crate::state::AppState;

// GET /api/stats - usage counters and limits, no client addresses
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(state.gateway.stats())
}
