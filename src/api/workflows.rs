/// Workflow REST API endpoints
///
/// Product upload (creates and starts a workflow), step completion callbacks
/// from downstream services, and read-only workflow status queries.

use crate::{
    error::OrchestrationError,
    orchestration::OrchestrationManager,
    workflow::types::{Payload, ProductUploadRequest, StepCompletion, StepOutcome, StepType, Workflow, WorkflowStatus},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    /// Orchestration manager driving every workflow
    pub manager: OrchestrationManager,
}

/// Response returned when a workflow is created
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub message: String,
}

/// Completion callback body sent by a downstream service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompletedRequest {
    pub workflow_id: String,
    pub step_id: String,
    #[serde(default)]
    pub step_type: Option<StepType>,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Payload>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl From<StepCompletedRequest> for StepCompletion {
    fn from(request: StepCompletedRequest) -> Self {
        let outcome = if request.success {
            StepOutcome::Succeeded(request.result.unwrap_or_default())
        } else {
            StepOutcome::Failed(request.error_msg.unwrap_or_default())
        };

        Self {
            workflow_id: request.workflow_id,
            step_id: request.step_id,
            step_type: request.step_type,
            outcome,
        }
    }
}

/// Query string for status lookups
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub workflow_id: Option<String>,
}

/// Create workflow routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workflows", get(list_workflows))
        .route("/api/v1/workflows/upload", post(upload_product))
        .route("/api/v1/workflows/step-completed", post(step_completed))
        .route("/api/v1/workflows/status", get(workflow_status))
        .route("/api/v1/workflows/{id}", get(get_workflow))
}

/// Upload a product and start its workflow
///
/// POST /api/v1/workflows/upload
/// Body: { "name": "...", "description": "...", "images": [...], "category": "...", "price": 0.0 }
/// Returns 202: { "workflow_id": "...", "status": "processing", "message": "..." }
async fn upload_product(
    State(state): State<AppState>,
    Json(product): Json<ProductUploadRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), OrchestrationError> {
    tracing::info!(
        "📦 Processing product upload: {} (category: {}, price: {})",
        product.name,
        product.category,
        product.price
    );

    let workflow = state.manager.create_workflow(product).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(WorkflowResponse {
            workflow_id: workflow.id,
            status: workflow.status,
            message: "Workflow started successfully".to_string(),
        }),
    ))
}

/// Step completion callback
///
/// POST /api/v1/workflows/step-completed
/// Body: { "workflow_id": "...", "step_id": "...", "step_type": "...", "success": true, "result": {...} }
async fn step_completed(
    State(state): State<AppState>,
    Json(request): Json<StepCompletedRequest>,
) -> Result<Json<Value>, OrchestrationError> {
    let workflow = state.manager.complete_step(request.into()).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Step completion processed successfully",
        "workflow": workflow,
    })))
}

/// List all workflows
///
/// GET /api/v1/workflows
async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let workflows = state.manager.list_workflows().await;
    Json(json!({ "count": workflows.len(), "workflows": workflows }))
}

/// Get a workflow by ID
///
/// GET /api/v1/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, OrchestrationError> {
    Ok(Json(state.manager.get_workflow(&id).await?))
}

/// Get a workflow by query parameter
///
/// GET /api/v1/workflows/status?workflow_id=...
async fn workflow_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Workflow>, (StatusCode, Json<Value>)> {
    let Some(workflow_id) = query.workflow_id.filter(|id| !id.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "workflow_id query parameter is required" })),
        ));
    };

    state
        .manager
        .get_workflow(&workflow_id)
        .await
        .map(Json)
        .map_err(|e| (e.status_code(), Json(json!({ "error": e.to_string() }))))
}
