/// In-memory workflow store
///
/// The single source of truth for orchestration state. One reader/writer lock
/// covers the whole map: every transition is a single critical section, reads
/// share the lock. Callers only ever receive cloned snapshots, never references
/// into the map.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::workflow::types::{
    Payload, ProductUploadRequest, StepCompletion, StepOutcome, Workflow, WorkflowStep,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Shared handle to the workflow map; clones point at the same state
#[derive(Debug, Clone, Default)]
pub struct WorkflowStore {
    /// Key: workflow_id, Value: workflow with its steps
    workflows: Arc<RwLock<HashMap<String, Workflow>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new workflow with a Pending three-step pipeline
    pub async fn create(&self, product: &ProductUploadRequest) -> Workflow {
        let workflow = Workflow::new(product);
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.clone(), workflow.clone());
        workflow
    }

    pub async fn get(&self, workflow_id: &str) -> OrchestrationResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::NotFound(workflow_id.to_string()))
    }

    /// Snapshot of every workflow, oldest first
    pub async fn list(&self) -> Vec<Workflow> {
        let mut snapshot: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }

    pub async fn apply_step_start(&self, workflow_id: &str, step_id: &str) -> OrchestrationResult<Workflow> {
        self.mutate(workflow_id, |workflow| workflow.start_step(step_id)).await
    }

    pub async fn apply_step_success(
        &self,
        workflow_id: &str,
        step_id: &str,
        result: Payload,
    ) -> OrchestrationResult<Workflow> {
        self.mutate(workflow_id, |workflow| workflow.complete_step(step_id, result)).await
    }

    pub async fn apply_step_failure(
        &self,
        workflow_id: &str,
        step_id: &str,
        message: &str,
    ) -> OrchestrationResult<Workflow> {
        self.mutate(workflow_id, |workflow| workflow.fail_step(step_id, message)).await
    }

    /// Read the cursor and mark that step Processing in one critical section
    ///
    /// Returns the post-mutation workflow and the started step.
    pub async fn start_current_step(&self, workflow_id: &str) -> OrchestrationResult<(Workflow, WorkflowStep)> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| OrchestrationError::NotFound(workflow_id.to_string()))?;

        let step_id = workflow
            .current_step()
            .map(|step| step.id.clone())
            .ok_or_else(|| OrchestrationError::PipelineExhausted(workflow_id.to_string()))?;

        workflow.start_step(&step_id)?;

        let step = workflow.steps[workflow.current_step_index].clone();
        Ok((workflow.clone(), step))
    }

    /// Validate and apply a service-reported completion in one critical section
    pub async fn apply_completion(&self, completion: &StepCompletion) -> OrchestrationResult<Workflow> {
        self.mutate(&completion.workflow_id, |workflow| {
            if let Some(reported) = completion.step_type {
                let stored = workflow
                    .step(&completion.step_id)
                    .map(|step| step.step_type)
                    .ok_or_else(|| OrchestrationError::StepNotFound {
                        workflow_id: workflow.id.clone(),
                        step_id: completion.step_id.clone(),
                    })?;
                if stored != reported {
                    return Err(OrchestrationError::InvalidTransition {
                        workflow_id: workflow.id.clone(),
                        status: workflow.status,
                        reason: format!(
                            "step {} is {} but completion reported {}",
                            completion.step_id, stored, reported
                        ),
                    });
                }
            }

            match &completion.outcome {
                StepOutcome::Succeeded(result) => workflow.complete_step(&completion.step_id, result.clone()),
                StepOutcome::Failed(message) => workflow.fail_step(&completion.step_id, message),
            }
        })
        .await
    }

    /// Run a transition under the write lock and return the resulting snapshot.
    /// A failed transition leaves the stored workflow untouched.
    async fn mutate<F>(&self, workflow_id: &str, transition: F) -> OrchestrationResult<Workflow>
    where
        F: FnOnce(&mut Workflow) -> OrchestrationResult<()>,
    {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| OrchestrationError::NotFound(workflow_id.to_string()))?;

        transition(workflow)?;
        Ok(workflow.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{StepStatus, StepType, WorkflowStatus};
    use serde_json::json;

    fn product(name: &str) -> ProductUploadRequest {
        ProductUploadRequest {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_pending_workflow() {
        let store = WorkflowStore::new();
        let created = store.create(&product("Chair")).await;

        let fetched = store.get(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.steps.len(), 3);
        assert_eq!(fetched.status, WorkflowStatus::Pending);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_workflow_is_not_found() {
        let store = WorkflowStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn list_is_a_detached_snapshot() {
        let store = WorkflowStore::new();
        let created = store.create(&product("Lamp")).await;

        let mut listed = store.list().await;
        listed[0].status = WorkflowStatus::Failed;

        assert_eq!(store.get(&created.id).await.unwrap().status, WorkflowStatus::Pending);
    }

    #[tokio::test]
    async fn start_current_step_walks_the_cursor_until_exhausted() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Desk")).await;

        for expected in StepType::PIPELINE {
            let (snapshot, step) = store.start_current_step(&workflow.id).await.unwrap();
            assert_eq!(step.step_type, expected);
            assert_eq!(step.status, StepStatus::Processing);
            assert_eq!(snapshot.processing_count(), 1);
            store.apply_step_success(&workflow.id, &step.id, Payload::new()).await.unwrap();
        }

        let err = store.start_current_step(&workflow.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::PipelineExhausted(_)));
        assert_eq!(store.get(&workflow.id).await.unwrap().status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn apply_step_start_by_id_matches_cursor() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Sofa")).await;

        let started = store.apply_step_start(&workflow.id, &workflow.steps[0].id).await.unwrap();
        assert_eq!(started.steps[0].status, StepStatus::Processing);

        let twice = store.apply_step_start(&workflow.id, &workflow.steps[0].id).await;
        assert!(matches!(twice, Err(OrchestrationError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn completion_with_mismatched_step_type_is_rejected_without_mutation() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Table")).await;
        let (before, step) = store.start_current_step(&workflow.id).await.unwrap();

        let completion = StepCompletion::succeeded(&workflow.id, &step.id, Payload::new())
            .with_step_type(StepType::SeoGeneration);
        let err = store.apply_completion(&completion).await.unwrap_err();

        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(store.get(&workflow.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn failure_completion_fails_workflow() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Rug")).await;
        let (_, step) = store.start_current_step(&workflow.id).await.unwrap();

        let failed = store
            .apply_completion(&StepCompletion::failed(&workflow.id, &step.id, "timeout"))
            .await
            .unwrap();

        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("timeout"));
        assert_eq!(failed.steps[0].error_message.as_deref(), Some("timeout"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap()["error_msg"],
            json!("timeout")
        );
    }

    #[tokio::test]
    async fn apply_step_failure_records_message_and_fails_workflow() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Shelf")).await;
        let (_, step) = store.start_current_step(&workflow.id).await.unwrap();

        let err = store.apply_step_failure("ghost", &step.id, "boom").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NotFound(id) if id == "ghost"));

        let failed = store
            .apply_step_failure(&workflow.id, &step.id, "image service: 503 upstream")
            .await
            .unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("image service: 503 upstream"));
        assert_eq!(failed.steps[0].status, StepStatus::Failed);
        assert_eq!(
            failed.steps[0].error_message.as_deref(),
            Some("image service: 503 upstream")
        );
        assert_eq!(store.get(&workflow.id).await.unwrap(), failed);
    }

    #[tokio::test]
    async fn failure_for_undispatched_step_is_rejected_without_mutation() {
        let store = WorkflowStore::new();
        let workflow = store.create(&product("Stool")).await;
        let (before, _) = store.start_current_step(&workflow.id).await.unwrap();

        let err = store
            .apply_completion(&StepCompletion::failed(&workflow.id, &workflow.steps[2].id, "seo says no"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));

        let stored = store.get(&workflow.id).await.unwrap();
        assert_eq!(stored, before);
        assert_eq!(stored.status, WorkflowStatus::Processing);
        assert_eq!(stored.processing_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_keep_every_workflow() {
        let store = WorkflowStore::new();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create(&product(&format!("item-{i}"))).await.id })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), 32);
        assert_eq!(store.len().await, 32);
    }
}
