mod config;
mod error;
mod gateway;
mod handlers;
mod image;
mod metrics;
mod models;
mod rate_limit;
mod state;
mod upstream;
mod usage;
mod worker;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Args;
use crate::gateway::Gateway;
use crate::state::AppState;
use crate::worker::eviction_worker;

// this is main async function with tokio
#[tokio::main]
async fn main() {
    init_tracing();

    // parse cli arguments (every option also has an env fallback)
    let args = Args::parse();
    let options = match args.gateway_options() {
        Ok(options) => options,
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let gateway = match Gateway::new(&options) {
        Ok(gateway) => gateway,
        Err(err) => {
            tracing::error!(%err, "failed to build the upstream client");
            std::process::exit(1);
        }
    };

    // creating shared state
    let state = Arc::new(AppState {
        gateway,
        trust_forwarded_for: options.trust_forwarded_for,
    });

    // spawn the background eviction worker
    tokio::spawn(eviction_worker(Arc::clone(&state), args.cleanup_interval()));

    let app = handlers::router(state);

    let addr = args.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "quiz gateway listening");
    tracing::info!(upstream = %options.upstream.base_url, model = %options.upstream.model, "forwarding to upstream");
    tracing::info!(
        max_image_bytes = options.max_image_bytes,
        quiz_limit = options.quiz_limit.max_requests,
        test_limit = options.test_limit.max_requests,
        window_secs = options.quiz_limit.window.as_secs(),
        "limits"
    );

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(err) = served {
        tracing::error!(%err, "server error");
        std::process::exit(1);
    }
    tracing::info!("quiz gateway stopped");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
