/// Workflow orchestration
///
/// Composes the workflow store, the event dispatcher and the notification hub
/// into the operations exposed to the API layer.

pub mod manager;

pub use manager::OrchestrationManager;
