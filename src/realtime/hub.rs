/// Real-time notification hub
///
/// A single task owns the observer registry and processes register, unregister
/// and broadcast commands one at a time. Each observer gets its own bounded
/// outbound queue, drained by the observer's connection task. Delivery never
/// waits: an observer whose queue is full is considered dead and is dropped.

use crate::workflow::types::{Payload, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};

pub type ObserverId = u64;

/// Kind of push notification sent to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    StepCompleted,
    WorkflowCompleted,
    WorkflowFailed,
}

/// Message pushed to every observer of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub workflow_id: String,
    pub data: Payload,
}

/// Receiving side of one observer registration
#[derive(Debug)]
pub struct Subscription {
    pub id: ObserverId,
    pub workflow_id: String,
    pub client_id: String,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    /// Next serialized `PushMessage`; `None` once the hub has closed this observer
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
struct Observer {
    workflow_id: String,
    client_id: String,
    sender: mpsc::Sender<String>,
}

#[derive(Debug)]
enum HubCommand {
    Register { id: ObserverId, observer: Observer },
    Unregister { id: ObserverId },
    Broadcast { workflow_id: String, message: String },
    Count { workflow_id: Option<String>, reply: oneshot::Sender<usize> },
}

/// Cloneable handle to the hub task
#[derive(Debug, Clone)]
pub struct NotificationHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    observer_buffer: usize,
}

impl NotificationHub {
    /// Start the hub control loop on the current tokio runtime
    ///
    /// The loop exits once every handle has been dropped.
    pub fn spawn(observer_buffer: usize) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_hub(receiver));

        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            observer_buffer: observer_buffer.max(1),
        }
    }

    /// Subscribe a new observer to one workflow
    pub fn register(&self, workflow_id: &str, client_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.observer_buffer);

        let observer = Observer {
            workflow_id: workflow_id.to_string(),
            client_id: client_id.to_string(),
            sender,
        };
        if self.commands.send(HubCommand::Register { id, observer }).is_err() {
            tracing::warn!("⚠️ Notification hub is not running; observer {} closed immediately", id);
        }

        Subscription {
            id,
            workflow_id: workflow_id.to_string(),
            client_id: client_id.to_string(),
            receiver,
        }
    }

    /// Remove an observer and close its outbound queue
    pub fn unregister(&self, id: ObserverId) {
        let _ = self.commands.send(HubCommand::Unregister { id });
    }

    /// Fan a notification out to every observer of `workflow_id`
    pub fn notify(&self, workflow_id: &str, kind: NotificationType, data: Payload) {
        let message = PushMessage {
            kind,
            workflow_id: workflow_id.to_string(),
            data,
        };

        let message = match serde_json::to_string(&message) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("❌ Failed to serialize push message for {}: {}", workflow_id, e);
                return;
            }
        };

        let command = HubCommand::Broadcast {
            workflow_id: workflow_id.to_string(),
            message,
        };
        if self.commands.send(command).is_err() {
            tracing::warn!("⚠️ Notification hub is not running; dropped update for {}", workflow_id);
        }
    }

    pub fn notify_step_completed(&self, workflow: &Workflow, step_id: &str, result: &Payload) {
        self.notify(
            &workflow.id,
            NotificationType::StepCompleted,
            payload(json!({
                "workflow": workflow,
                "step_id": step_id,
                "result": result,
                "message": "Step completed",
            })),
        );
    }

    pub fn notify_workflow_completed(&self, workflow: &Workflow) {
        self.notify(
            &workflow.id,
            NotificationType::WorkflowCompleted,
            payload(json!({
                "workflow": workflow,
                "message": "Workflow completed successfully",
            })),
        );
    }

    pub fn notify_workflow_failed(&self, workflow: &Workflow, error_message: &str) {
        self.notify(
            &workflow.id,
            NotificationType::WorkflowFailed,
            payload(json!({
                "workflow": workflow,
                "error": error_message,
                "message": "Workflow failed",
            })),
        );
    }

    /// Observers currently registered for one workflow
    ///
    /// Answered by the control loop, so every command sent before this call
    /// has been applied.
    pub async fn observer_count(&self, workflow_id: &str) -> usize {
        self.count(Some(workflow_id.to_string())).await
    }

    pub async fn total_observers(&self) -> usize {
        self.count(None).await
    }

    async fn count(&self, workflow_id: Option<String>) -> usize {
        let (reply, answer) = oneshot::channel();
        if self.commands.send(HubCommand::Count { workflow_id, reply }).is_err() {
            return 0;
        }
        answer.await.unwrap_or(0)
    }
}

fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Hub control loop; sole owner of the registry
async fn run_hub(mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    let mut observers: HashMap<ObserverId, Observer> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { id, observer } => {
                tracing::info!(
                    "🔌 Observer connected: {} (client: {}, workflow: {})",
                    id,
                    observer.client_id,
                    observer.workflow_id
                );
                observers.insert(id, observer);
            }
            HubCommand::Unregister { id } => {
                // dropping the sender closes the observer's queue
                if let Some(observer) = observers.remove(&id) {
                    tracing::info!(
                        "🔌 Observer disconnected: {} (client: {}, workflow: {})",
                        id,
                        observer.client_id,
                        observer.workflow_id
                    );
                }
            }
            HubCommand::Broadcast { workflow_id, message } => {
                let mut dead = Vec::new();

                for (id, observer) in observers.iter().filter(|(_, o)| o.workflow_id == workflow_id) {
                    match observer.sender.try_send(message.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(
                                "🐌 Observer {} (client: {}) is not keeping up; dropping it",
                                id,
                                observer.client_id
                            );
                            dead.push(*id);
                        }
                        Err(TrySendError::Closed(_)) => dead.push(*id),
                    }
                }

                for id in dead {
                    observers.remove(&id);
                }
            }
            HubCommand::Count { workflow_id, reply } => {
                let count = match workflow_id {
                    Some(workflow_id) => observers.values().filter(|o| o.workflow_id == workflow_id).count(),
                    None => observers.len(),
                };
                let _ = reply.send(count);
            }
        }
    }

    tracing::debug!("Notification hub stopped");
}
