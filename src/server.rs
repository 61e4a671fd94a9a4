/// Server setup and initialization
///
/// Wires together all components: workflow store, event dispatcher, notification
/// hub, orchestration manager and HTTP routes.

use crate::{
    api::{create_workflow_routes, create_ws_routes, AppState},
    config::Config,
    events::{EventDispatcher, EventTransport, InMemoryTransport, RedisTransport},
    orchestration::OrchestrationManager,
    realtime::NotificationHub,
    workflow::store::WorkflowStore,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the orchestration manager and its collaborators from configuration
///
/// Connects to Redis when a broker URL is configured; otherwise events stay
/// in-process.
pub async fn create_manager(config: &Config) -> Result<OrchestrationManager> {
    let transport: Arc<dyn EventTransport> = match &config.broker.redis_url {
        Some(url) => {
            tracing::info!(
                "📡 Connecting to Redis broker (stream prefix: {}, max length: ~{})",
                config.broker.exchange,
                config.broker.stream_max_len
            );
            let transport = RedisTransport::connect(url, &config.broker.exchange, config.broker.stream_max_len)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Redis broker: {}", e))?;
            tracing::info!("✅ Connected to Redis broker");
            Arc::new(transport)
        }
        None => {
            tracing::warn!("⚠️ PIPELINE_REDIS_URL not set; events will not leave this process");
            Arc::new(InMemoryTransport::new())
        }
    };

    tracing::info!(
        "🔁 Event dispatcher: {} retries, {}ms delay, {}ms deadline",
        config.broker.max_retries,
        config.broker.retry_delay_ms,
        config.broker.publish_timeout_ms
    );
    let dispatcher = EventDispatcher::new(transport, &config.broker);

    tracing::info!("🔔 Starting notification hub (observer buffer: {})", config.hub.observer_buffer);
    let hub = NotificationHub::spawn(config.hub.observer_buffer);

    Ok(OrchestrationManager::new(WorkflowStore::new(), dispatcher, hub))
}

/// Create the Axum router around an existing manager
pub fn build_router(manager: OrchestrationManager) -> Router {
    let state = AppState { manager };

    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Workflow API routes
        .merge(create_workflow_routes())
        // Live update subscriptions
        .merge(create_ws_routes())
        .with_state(state)
}

/// Create the main Axum application with all routes
pub async fn create_app(config: &Config) -> Result<Router> {
    let manager = create_manager(config).await?;
    tracing::info!("✅ Application initialized successfully");
    Ok(build_router(manager))
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C or SIGTERM, then drains in-flight requests.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting pipeline orchestrator...");

    let app = create_app(&config).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down server...");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
