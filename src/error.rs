/// Error taxonomy for orchestration and event dispatch
///
/// `OrchestrationError` is what callers of the manager see. `DispatchError`
/// describes a publish that never reached the broker.

use crate::workflow::types::WorkflowStatus;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure to deliver an event to the broker
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every attempt in the retry budget failed; carries the last error
    #[error("failed to publish event after {attempts} attempts: {source}")]
    Delivery {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("publish deadline of {timeout_ms}ms exceeded")]
    Timeout { timeout_ms: u128 },
}

/// Errors surfaced by the orchestration manager
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("step {step_id} not found in workflow {workflow_id}")]
    StepNotFound { workflow_id: String, step_id: String },

    /// No step remains after the cursor
    #[error("no more steps to execute in workflow {0}")]
    PipelineExhausted(String),

    #[error("invalid transition for workflow {workflow_id} ({status}): {reason}")]
    InvalidTransition {
        workflow_id: String,
        status: WorkflowStatus,
        reason: String,
    },

    #[error("failed to dispatch {event} for workflow {workflow_id}: {source}")]
    DispatchFailure {
        workflow_id: String,
        event: String,
        #[source]
        source: DispatchError,
    },

    /// A downstream service reported that its step failed
    #[error("workflow step failed: {message}")]
    StepFailureReported {
        workflow_id: String,
        step_id: String,
        message: String,
    },
}

/// Result type alias for orchestration operations
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl OrchestrationError {
    /// HTTP status used when this error crosses the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::StepNotFound { .. } => StatusCode::NOT_FOUND,
            Self::PipelineExhausted(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::DispatchFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::StepFailureReported { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for OrchestrationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
