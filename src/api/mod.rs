/// HTTP API Layer
///
/// This module provides the boundary between HTTP clients and the orchestrator:
/// - Product upload and step completion callbacks
/// - Workflow status queries
/// - WebSocket subscriptions for live workflow updates

// Workflow endpoints (upload, step-completed, status, list)
pub mod workflows;

// WebSocket observer endpoint
pub mod ws;

// Re-export router builders
pub use workflows::{create_workflow_routes, AppState};
pub use ws::create_ws_routes;
