/// Pipeline orchestrator
///
/// Main entry point. Loads configuration from the environment (and `.env`) and
/// starts the HTTP server.

use pipeline_orchestrator::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow API at /api/v1/workflows/*
/// - Live updates at /api/v1/workflows/ws
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    let config = Config::default();

    start_server(config).await
}
