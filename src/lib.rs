/// Pipeline orchestrator: coordinator for the product processing pipeline
///
/// A submitted product becomes a workflow that travels through image processing,
/// AI enhancement and SEO generation. Each stage is dispatched to its service over
/// the event broker, services report completion back, and live clients follow
/// progress over WebSockets.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Workflow model, step state machine and in-memory store
pub mod workflow;

// Broker events: envelope, transports and retrying dispatcher
pub mod events;

// Real-time notification hub for live observers
pub mod realtime;

// Orchestration manager driving step transitions
pub mod orchestration;

// HTTP API layer - upload, step callbacks, status and WebSocket endpoints
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{DispatchError, OrchestrationError};
pub use events::{EventDispatcher, WorkflowEvent};
pub use orchestration::OrchestrationManager;
pub use realtime::NotificationHub;
pub use server::start_server;
pub use workflow::{Workflow, WorkflowStep, WorkflowStore};
