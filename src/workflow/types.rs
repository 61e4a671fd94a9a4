/// Core workflow type definitions and the step state machine
///
/// A workflow is one submitted product travelling through a fixed, strictly
/// sequential three-stage pipeline. These types are serialized as-is in API
/// responses, broker events and push notifications.

use crate::error::{OrchestrationError, OrchestrationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Schema-less passthrough payload (submission metadata, service results).
/// The orchestrator never interprets its contents.
pub type Payload = Map<String, Value>;

/// Lifecycle of a whole workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and Failed are terminal; nothing transitions out of them
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three pipeline stages, each owned by one downstream service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Image resizing and optimization
    ImageProcessing,
    /// AI description and attribute enhancement
    AiEnhancement,
    /// SEO title, keywords and description generation
    SeoGeneration,
}

impl StepType {
    /// Execution order of every workflow
    pub const PIPELINE: [StepType; 3] = [
        StepType::ImageProcessing,
        StepType::AiEnhancement,
        StepType::SeoGeneration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageProcessing => "image_processing",
            Self::AiEnhancement => "ai_enhancement",
            Self::SeoGeneration => "seo_generation",
        }
    }

    /// Informational label of the service that consumes this stage
    pub fn service_name(self) -> &'static str {
        match self {
            Self::ImageProcessing => "image-service",
            Self::AiEnhancement => "ai-service",
            Self::SeoGeneration => "seo-service",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product submission as received from the upload endpoint
///
/// Stored verbatim under `metadata.product_data`; every field is optional so
/// partial payloads such as `{"name": "Chair"}` are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductUploadRequest {
    pub name: String,
    pub description: String,
    /// Image URLs or base64 encoded images
    pub images: Vec<String>,
    pub category: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
}

/// One stage of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(rename = "error_msg", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WorkflowStep {
    fn pending(step_type: StepType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_type,
            status: StepStatus::Pending,
            service_name: step_type.service_name().to_string(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }
}

/// A complete product processing workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub product_id: String,
    pub status: WorkflowStatus,
    /// Always the three stages of `StepType::PIPELINE`, in order
    pub steps: Vec<WorkflowStep>,
    /// Cursor into `steps`; equals `steps.len()` iff the workflow is Completed
    #[serde(rename = "current_step")]
    pub current_step_index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: Payload,
    #[serde(rename = "error_msg", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Workflow {
    /// Build a fresh workflow with all steps Pending
    pub fn new(product: &ProductUploadRequest) -> Self {
        let now = Utc::now();
        let mut metadata = Payload::new();
        metadata.insert(
            "product_data".to_string(),
            serde_json::to_value(product).unwrap_or_default(),
        );

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: format!("product_{}", uuid::Uuid::new_v4().simple()),
            status: WorkflowStatus::Pending,
            steps: StepType::PIPELINE.into_iter().map(WorkflowStep::pending).collect(),
            current_step_index: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            metadata,
            error_message: None,
        }
    }

    /// Step under the cursor, `None` once the pipeline is exhausted
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Number of steps currently Processing; never more than one
    pub fn processing_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Processing)
            .count()
    }

    /// Pending → Processing for the step under the cursor
    pub fn start_step(&mut self, step_id: &str) -> OrchestrationResult<()> {
        self.ensure_active()?;
        let index = self.step_index(step_id)?;

        if index != self.current_step_index {
            return Err(self.invalid(format!(
                "step {} is not the current step (cursor at {})",
                step_id, self.current_step_index
            )));
        }
        if self.steps[index].status != StepStatus::Pending {
            return Err(self.invalid(format!(
                "step {} cannot start from {}",
                step_id, self.steps[index].status
            )));
        }

        let now = Utc::now();
        let step = &mut self.steps[index];
        step.status = StepStatus::Processing;
        step.started_at = Some(now);
        self.updated_at = now;

        if self.status == WorkflowStatus::Pending {
            self.status = WorkflowStatus::Processing;
        }

        Ok(())
    }

    /// Processing → Completed; advances the cursor and completes the workflow
    /// after the last step
    pub fn complete_step(&mut self, step_id: &str, result: Payload) -> OrchestrationResult<()> {
        self.ensure_active()?;
        let index = self.step_index(step_id)?;

        if self.steps[index].status != StepStatus::Processing {
            return Err(self.invalid(format!(
                "step {} cannot complete from {}",
                step_id, self.steps[index].status
            )));
        }

        let now = Utc::now();
        let step = &mut self.steps[index];
        step.status = StepStatus::Completed;
        step.completed_at = Some(now);
        step.result = Some(result);
        self.updated_at = now;

        // only the step under the cursor can be Processing
        self.current_step_index = index + 1;
        if self.current_step_index >= self.steps.len() {
            self.status = WorkflowStatus::Completed;
            self.completed_at = Some(now);
        }

        Ok(())
    }

    /// Processing → Failed for the step under the cursor; fails the whole workflow
    pub fn fail_step(&mut self, step_id: &str, message: &str) -> OrchestrationResult<()> {
        self.ensure_active()?;
        let index = self.step_index(step_id)?;

        if index != self.current_step_index {
            return Err(self.invalid(format!(
                "step {} is not the current step (cursor at {})",
                step_id, self.current_step_index
            )));
        }
        if self.steps[index].status != StepStatus::Processing {
            return Err(self.invalid(format!(
                "step {} cannot fail from {}",
                step_id, self.steps[index].status
            )));
        }

        let now = Utc::now();
        let step = &mut self.steps[index];
        step.status = StepStatus::Failed;
        step.completed_at = Some(now);
        step.error_message = Some(message.to_string());

        self.status = WorkflowStatus::Failed;
        self.error_message = Some(message.to_string());
        self.updated_at = now;

        Ok(())
    }

    fn ensure_active(&self) -> OrchestrationResult<()> {
        if self.is_terminal() {
            return Err(self.invalid("workflow is already terminal".to_string()));
        }
        Ok(())
    }

    fn step_index(&self, step_id: &str) -> OrchestrationResult<usize> {
        self.steps
            .iter()
            .position(|step| step.id == step_id)
            .ok_or_else(|| OrchestrationError::StepNotFound {
                workflow_id: self.id.clone(),
                step_id: step_id.to_string(),
            })
    }

    fn invalid(&self, reason: String) -> OrchestrationError {
        OrchestrationError::InvalidTransition {
            workflow_id: self.id.clone(),
            status: self.status,
            reason,
        }
    }
}

/// What a downstream service reported for its step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Succeeded(Payload),
    Failed(String),
}

/// A step completion callback from a downstream service
#[derive(Debug, Clone, PartialEq)]
pub struct StepCompletion {
    pub workflow_id: String,
    pub step_id: String,
    /// When present, must match the stored step's type
    pub step_type: Option<StepType>,
    pub outcome: StepOutcome,
}

impl StepCompletion {
    pub fn succeeded(workflow_id: &str, step_id: &str, result: Payload) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            step_type: None,
            outcome: StepOutcome::Succeeded(result),
        }
    }

    pub fn failed(workflow_id: &str, step_id: &str, message: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            step_type: None,
            outcome: StepOutcome::Failed(message.to_string()),
        }
    }

    pub fn with_step_type(mut self, step_type: StepType) -> Self {
        self.step_type = Some(step_type);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StepOutcome::Succeeded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chair() -> ProductUploadRequest {
        ProductUploadRequest {
            name: "Chair".to_string(),
            ..Default::default()
        }
    }

    fn result(url: &str) -> Payload {
        let mut payload = Payload::new();
        payload.insert("url".to_string(), json!(url));
        payload
    }

    #[test]
    fn new_workflow_has_three_pending_steps_in_pipeline_order() {
        let workflow = Workflow::new(&chair());

        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.current_step_index, 0);
        assert!(workflow.product_id.starts_with("product_"));
        let types: Vec<StepType> = workflow.steps.iter().map(|s| s.step_type).collect();
        assert_eq!(types, StepType::PIPELINE.to_vec());
        assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(workflow.metadata["product_data"]["name"], json!("Chair"));
    }

    #[test]
    fn walking_the_pipeline_completes_the_workflow() {
        let mut workflow = Workflow::new(&chair());

        for index in 0..workflow.steps.len() {
            let step_id = workflow.steps[index].id.clone();
            workflow.start_step(&step_id).unwrap();
            assert_eq!(workflow.status, WorkflowStatus::Processing);
            assert_eq!(workflow.processing_count(), 1);

            workflow.complete_step(&step_id, result("x")).unwrap();
            assert_eq!(workflow.current_step_index, index + 1);
        }

        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.current_step_index, workflow.steps.len());
        assert!(workflow.completed_at.is_some());
        assert!(workflow.current_step().is_none());
    }

    #[test]
    fn only_the_current_step_may_start() {
        let mut workflow = Workflow::new(&chair());
        let second = workflow.steps[1].id.clone();

        let err = workflow.start_step(&second).unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.processing_count(), 0);
    }

    #[test]
    fn failure_is_terminal_and_keeps_message_verbatim() {
        let mut workflow = Workflow::new(&chair());
        let first = workflow.steps[0].id.clone();
        workflow.start_step(&first).unwrap();

        workflow.fail_step(&first, "image decode error: bad header").unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(workflow.error_message.as_deref(), Some("image decode error: bad header"));
        assert_eq!(workflow.steps[0].status, StepStatus::Failed);

        let snapshot = workflow.clone();
        assert!(workflow.complete_step(&first, Payload::new()).is_err());
        let second = workflow.steps[1].id.clone();
        assert!(workflow.start_step(&second).is_err());
        assert_eq!(workflow, snapshot);
    }

    #[test]
    fn only_the_dispatched_step_may_fail() {
        let mut workflow = Workflow::new(&chair());
        let first = workflow.steps[0].id.clone();
        let last = workflow.steps[2].id.clone();

        // nothing dispatched yet
        let err = workflow.fail_step(&first, "too early").unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));

        workflow.start_step(&first).unwrap();
        let snapshot = workflow.clone();

        let err = workflow.fail_step(&last, "seo says no").unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(workflow, snapshot);
        assert_eq!(workflow.status, WorkflowStatus::Processing);
        assert_eq!(workflow.steps[0].status, StepStatus::Processing);
    }

    #[test]
    fn unknown_step_leaves_workflow_untouched() {
        let mut workflow = Workflow::new(&chair());
        let snapshot = workflow.clone();

        let err = workflow.complete_step("missing", Payload::new()).unwrap_err();
        assert!(matches!(err, OrchestrationError::StepNotFound { .. }));
        assert_eq!(workflow, snapshot);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let workflow = Workflow::new(&chair());
        let value = serde_json::to_value(&workflow).unwrap();

        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["current_step"], json!(0));
        assert_eq!(value["steps"][0]["type"], json!("image_processing"));
        assert_eq!(value["steps"][0]["service_name"], json!("image-service"));
        assert!(value.get("error_msg").is_none());
        assert!(value.get("completed_at").is_none());
    }
}
