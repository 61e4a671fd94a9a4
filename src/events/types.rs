/// Orchestration event model
///
/// Every event published to the broker has the same envelope:
/// `{type, workflow_id, step_id?, step_type?, payload, timestamp}`.

use crate::workflow::types::{Payload, StepType, Workflow, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Category of an orchestration event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "workflow.start")]
    WorkflowStart,
    /// A step was marked Processing and must be picked up by its service
    #[serde(rename = "workflow.next_step")]
    StepDispatch,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted,
    #[serde(rename = "workflow.failed")]
    WorkflowFailed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowStart => "workflow.start",
            Self::StepDispatch => "workflow.next_step",
            Self::StepCompleted => "step.completed",
            Self::WorkflowCompleted => "workflow.completed",
            Self::WorkflowFailed => "workflow.failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing key that directs a dispatch to the queue of one step's service
pub fn step_routing_key(step_type: StepType) -> String {
    format!("step.{}", step_type.as_str())
}

/// Wire envelope for broker events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    fn new(event_type: EventType, workflow: &Workflow, payload: Value) -> Self {
        Self {
            event_type,
            workflow_id: workflow.id.clone(),
            step_id: None,
            step_type: None,
            payload: match payload {
                Value::Object(map) => map,
                _ => Payload::new(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn workflow_start(workflow: &Workflow) -> Self {
        Self::new(EventType::WorkflowStart, workflow, json!({ "workflow": workflow }))
    }

    pub fn step_dispatch(workflow: &Workflow, step: &WorkflowStep) -> Self {
        let mut event = Self::new(
            EventType::StepDispatch,
            workflow,
            json!({ "workflow": workflow, "step": step }),
        );
        event.step_id = Some(step.id.clone());
        event.step_type = Some(step.step_type);
        event
    }

    pub fn step_completed(workflow: &Workflow, step: &WorkflowStep, result: &Payload) -> Self {
        let mut event = Self::new(
            EventType::StepCompleted,
            workflow,
            json!({ "workflow": workflow, "result": result }),
        );
        event.step_id = Some(step.id.clone());
        event.step_type = Some(step.step_type);
        event
    }

    pub fn workflow_completed(workflow: &Workflow) -> Self {
        Self::new(EventType::WorkflowCompleted, workflow, json!({ "workflow": workflow }))
    }

    pub fn workflow_failed(workflow: &Workflow, error_message: &str) -> Self {
        Self::new(
            EventType::WorkflowFailed,
            workflow,
            json!({ "workflow": workflow, "error_msg": error_message }),
        )
    }

    /// Topic this event is published under
    pub fn routing_key(&self) -> String {
        match (self.event_type, self.step_type) {
            (EventType::StepDispatch, Some(step_type)) => step_routing_key(step_type),
            (event_type, _) => event_type.as_str().to_string(),
        }
    }

    /// Broker message id: `<workflow_id>-<type>`, or `<workflow_id>-<type>-<step_id>`
    /// for step-scoped events
    pub fn message_id(&self) -> String {
        match &self.step_id {
            Some(step_id) => format!("{}-{}-{}", self.workflow_id, self.event_type, step_id),
            None => format!("{}-{}", self.workflow_id, self.event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::ProductUploadRequest;

    #[test]
    fn routing_keys_follow_topic_scheme() {
        let workflow = Workflow::new(&ProductUploadRequest::default());
        let step = &workflow.steps[0];

        assert_eq!(WorkflowEvent::workflow_start(&workflow).routing_key(), "workflow.start");
        assert_eq!(WorkflowEvent::step_dispatch(&workflow, step).routing_key(), "step.image_processing");
        assert_eq!(
            WorkflowEvent::step_completed(&workflow, step, &Payload::new()).routing_key(),
            "step.completed"
        );
        assert_eq!(WorkflowEvent::workflow_completed(&workflow).routing_key(), "workflow.completed");
        assert_eq!(WorkflowEvent::workflow_failed(&workflow, "x").routing_key(), "workflow.failed");
        assert_eq!(step_routing_key(StepType::SeoGeneration), "step.seo_generation");
    }

    #[test]
    fn dispatch_envelope_carries_step_routing_info() {
        let workflow = Workflow::new(&ProductUploadRequest::default());
        let step = &workflow.steps[1];
        let value = serde_json::to_value(WorkflowEvent::step_dispatch(&workflow, step)).unwrap();

        assert_eq!(value["type"], "workflow.next_step");
        assert_eq!(value["workflow_id"], workflow.id.as_str());
        assert_eq!(value["step_id"], step.id.as_str());
        assert_eq!(value["step_type"], "ai_enhancement");
        assert_eq!(value["payload"]["step"]["service_name"], "ai-service");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn step_dispatch_ids_are_distinct_per_step() {
        let workflow = Workflow::new(&ProductUploadRequest::default());
        let ids: Vec<String> = workflow
            .steps
            .iter()
            .map(|step| WorkflowEvent::step_dispatch(&workflow, step).message_id())
            .collect();

        assert_eq!(ids[0], format!("{}-workflow.next_step-{}", workflow.id, workflow.steps[0].id));
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(
            WorkflowEvent::workflow_start(&workflow).message_id(),
            format!("{}-workflow.start", workflow.id)
        );
    }

    #[test]
    fn workflow_level_events_omit_step_fields() {
        let workflow = Workflow::new(&ProductUploadRequest::default());
        let value = serde_json::to_value(WorkflowEvent::workflow_failed(&workflow, "boom")).unwrap();

        assert!(value.get("step_id").is_none());
        assert!(value.get("step_type").is_none());
        assert_eq!(value["payload"]["error_msg"], "boom");
    }
}
