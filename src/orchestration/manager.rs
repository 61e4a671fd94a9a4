/// Orchestration manager
///
/// Drives workflows through their steps: creates them, dispatches each step to
/// its downstream service and applies the completions services report back.
///
/// State transitions happen inside the store's critical section; events and
/// notifications are published afterwards from the resulting snapshot, so
/// broker latency never holds the store lock. Event failures are handled
/// asymmetrically: a failed dispatch is returned to the caller (the pipeline
/// did not actually advance), while failures to announce an already applied
/// completion are only logged.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::events::{EventDispatcher, WorkflowEvent};
use crate::realtime::NotificationHub;
use crate::workflow::{
    store::WorkflowStore,
    types::{Payload, ProductUploadRequest, StepCompletion, StepOutcome, Workflow, WorkflowStatus},
};

#[derive(Debug, Clone)]
pub struct OrchestrationManager {
    store: WorkflowStore,
    dispatcher: EventDispatcher,
    hub: NotificationHub,
}

impl OrchestrationManager {
    pub fn new(store: WorkflowStore, dispatcher: EventDispatcher, hub: NotificationHub) -> Self {
        Self { store, dispatcher, hub }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Create a workflow for a product, announce it and dispatch its first step
    ///
    /// The workflow stays in the store even when announcing or dispatching
    /// fails; the error tells the caller the pipeline did not start.
    pub async fn create_workflow(&self, product: ProductUploadRequest) -> OrchestrationResult<Workflow> {
        let workflow = self.store.create(&product).await;

        tracing::info!(
            "🆕 Created workflow {} for product {} ({})",
            workflow.id,
            workflow.product_id,
            product.name
        );

        let event = WorkflowEvent::workflow_start(&workflow);
        if let Err(e) = self.dispatcher.publish(&event, &event.routing_key()).await {
            tracing::error!("❌ Failed to publish workflow start event for {}: {}", workflow.id, e);
            return Err(OrchestrationError::DispatchFailure {
                workflow_id: workflow.id,
                event: event.event_type.to_string(),
                source: e,
            });
        }

        self.start_next_step(&workflow.id).await.inspect_err(|e| {
            tracing::error!("❌ Failed to start first step of {}: {}", workflow.id, e);
        })
    }

    /// Mark the step under the cursor Processing and dispatch it to its service
    ///
    /// On dispatch failure the step stays Processing; nothing re-drives it.
    pub async fn start_next_step(&self, workflow_id: &str) -> OrchestrationResult<Workflow> {
        let (workflow, step) = self.store.start_current_step(workflow_id).await?;

        tracing::info!(
            "▶️ Starting step {} ({}) of workflow {} on {}",
            step.id,
            step.step_type,
            workflow.id,
            step.service_name
        );

        let event = WorkflowEvent::step_dispatch(&workflow, &step);
        if let Err(e) = self.dispatcher.publish(&event, &event.routing_key()).await {
            tracing::error!(
                "❌ Failed to dispatch step {} of workflow {}; step left processing: {}",
                step.id,
                workflow.id,
                e
            );
            return Err(OrchestrationError::DispatchFailure {
                workflow_id: workflow.id,
                event: event.event_type.to_string(),
                source: e,
            });
        }

        Ok(workflow)
    }

    /// Apply a completion reported by a downstream service
    ///
    /// Success advances the pipeline (or completes the workflow after the last
    /// step). A reported failure fails the workflow and is returned as
    /// `StepFailureReported` once the state change has been applied.
    pub async fn complete_step(&self, completion: StepCompletion) -> OrchestrationResult<Workflow> {
        tracing::info!(
            "📥 Processing step completion: workflow {} step {} (success: {})",
            completion.workflow_id,
            completion.step_id,
            completion.is_success()
        );

        let workflow = match self.store.apply_completion(&completion).await {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Rejected completion for workflow {} step {}: {}",
                    completion.workflow_id,
                    completion.step_id,
                    e
                );
                return Err(e);
            }
        };

        match completion.outcome {
            StepOutcome::Succeeded(result) => self.after_step_success(workflow, &completion.step_id, result).await,
            StepOutcome::Failed(message) => self.after_step_failure(workflow, &completion.step_id, message).await,
        }
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> OrchestrationResult<Workflow> {
        self.store.get(workflow_id).await
    }

    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.store.list().await
    }

    async fn after_step_success(
        &self,
        workflow: Workflow,
        step_id: &str,
        result: Payload,
    ) -> OrchestrationResult<Workflow> {
        if let Some(step) = workflow.step(step_id) {
            let event = WorkflowEvent::step_completed(&workflow, step, &result);
            if let Err(e) = self.dispatcher.publish(&event, &event.routing_key()).await {
                tracing::error!("❌ Failed to publish step completed event for {}: {}", workflow.id, e);
            }
        }

        if workflow.status == WorkflowStatus::Completed {
            tracing::info!("🎉 Workflow {} completed", workflow.id);

            let event = WorkflowEvent::workflow_completed(&workflow);
            if let Err(e) = self.dispatcher.publish(&event, &event.routing_key()).await {
                tracing::error!("❌ Failed to publish workflow completed event for {}: {}", workflow.id, e);
            }

            self.hub.notify_workflow_completed(&workflow);
            return Ok(workflow);
        }

        let advanced = self.start_next_step(&workflow.id).await;

        // observers see the freshest state, whether or not the dispatch went out
        let latest = match &advanced {
            Ok(next) => next.clone(),
            Err(_) => self.store.get(&workflow.id).await.unwrap_or(workflow),
        };
        self.hub.notify_step_completed(&latest, step_id, &result);

        advanced
    }

    async fn after_step_failure(
        &self,
        workflow: Workflow,
        step_id: &str,
        message: String,
    ) -> OrchestrationResult<Workflow> {
        tracing::error!("💥 Workflow {} failed at step {}: {}", workflow.id, step_id, message);

        let event = WorkflowEvent::workflow_failed(&workflow, &message);
        if let Err(e) = self.dispatcher.publish(&event, &event.routing_key()).await {
            tracing::error!("❌ Failed to publish workflow failed event for {}: {}", workflow.id, e);
        }

        self.hub.notify_workflow_failed(&workflow, &message);

        Err(OrchestrationError::StepFailureReported {
            workflow_id: workflow.id,
            step_id: step_id.to_string(),
            message,
        })
    }
}
