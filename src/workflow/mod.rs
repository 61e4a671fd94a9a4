/// Workflow Management Layer
///
/// This module holds the product workflow model and its shared store:
/// - Type definitions (Workflow, WorkflowStep, statuses, step types)
/// - Step state machine enforced by `Workflow` itself
/// - Concurrency-safe in-memory store keyed by workflow id

// Core workflow type definitions
pub mod types;

// In-memory workflow store guarded by an async RwLock
pub mod store;

// Re-export commonly used types
pub use store::WorkflowStore;
pub use types::{
    Payload, ProductUploadRequest, StepCompletion, StepOutcome, StepStatus, StepType, Workflow, WorkflowStatus,
    WorkflowStep,
};
