use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::state::AppState;

// Idle eviction - drops rate-limit windows whose requests have all aged out
pub async fn eviction_worker(state: Arc<AppState>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval = ?every, "idle eviction worker started");

    loop {
        ticker.tick().await;

        let evicted = state.gateway.evict_idle_clients();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate-limit windows");
        }
    }
}
