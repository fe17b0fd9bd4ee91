//! rscrop HTTP Server Binary
//!
//! Serves the crop analysis pipeline over a REST API.
//!
//! # Usage
//!
//! ```bash
//! RSCROP__PROVIDER__ENDPOINT=https://ndvi.example.org \
//! RSCROP__PROVIDER__API_KEY=... \
//!   cargo run --bin rscrop-server
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `RUST_LOG`: Log filter (default: info)
//! - `RSCROP__*`: pipeline settings, see `rscrop.example.toml`

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rscrop::{load_settings, Pipeline};
use rscrop_server::http::{create_router, AppState};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting rscrop HTTP Server");

    // The remote provider uses a blocking HTTP client, which must be
    // created and dropped outside the async runtime.
    let settings = load_settings().context("failed to load settings")?;
    let pipeline = Arc::new(Pipeline::from_settings(&settings)?);
    info!(
        data_source = pipeline.data_source().primary_name(),
        model_loaded = pipeline.model_loaded(),
        "Pipeline initialized"
    );

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve(AppState::new(Arc::clone(&pipeline))))?;
    drop(runtime);
    Ok(())
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
