/// Event dispatcher with bounded retry
///
/// Serializes events and hands them to the configured transport, retrying
/// transient failures with a fixed delay. The whole publish, retries included,
/// runs under a deadline.

use crate::config::BrokerConfig;
use crate::error::DispatchError;
use crate::events::transport::{EventTransport, OutboundMessage};
use crate::events::types::WorkflowEvent;
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone)]
pub struct EventDispatcher {
    transport: Arc<dyn EventTransport>,
    /// Attempts after the first one
    max_retries: u32,
    retry_delay: Duration,
    /// Default deadline for a publish when the caller supplies none
    publish_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(transport: Arc<dyn EventTransport>, config: &BrokerConfig) -> Self {
        Self::with_policy(
            transport,
            config.max_retries,
            config.retry_delay(),
            config.publish_timeout(),
        )
    }

    pub fn with_policy(
        transport: Arc<dyn EventTransport>,
        max_retries: u32,
        retry_delay: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            max_retries,
            retry_delay,
            publish_timeout,
        }
    }

    /// Publish under the default deadline
    pub async fn publish(&self, event: &WorkflowEvent, routing_key: &str) -> Result<(), DispatchError> {
        self.publish_within(event, routing_key, self.publish_timeout).await
    }

    /// Publish under a caller-supplied deadline
    pub async fn publish_within(
        &self,
        event: &WorkflowEvent,
        routing_key: &str,
        deadline: Duration,
    ) -> Result<(), DispatchError> {
        let message = OutboundMessage {
            routing_key: routing_key.to_string(),
            message_id: event.message_id(),
            content_type: "application/json",
            body: serde_json::to_string(event)?,
        };

        tracing::debug!(
            "📤 Publishing {} for workflow {} via {} (routing key: {})",
            event.event_type,
            event.workflow_id,
            self.transport.name(),
            routing_key
        );

        match tokio::time::timeout(deadline, self.deliver_with_retry(&message)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    "⏱️ Publish of {} for workflow {} exceeded its {:?} deadline",
                    event.event_type,
                    event.workflow_id,
                    deadline
                );
                Err(DispatchError::Timeout {
                    timeout_ms: deadline.as_millis(),
                })
            }
        }
    }

    async fn deliver_with_retry(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        let total_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.transport.send(message).await {
                Ok(()) => {
                    tracing::info!(
                        "✅ Event published: {} (routing key: {}, attempt {}/{})",
                        message.message_id,
                        message.routing_key,
                        attempt,
                        total_attempts
                    );
                    return Ok(());
                }
                Err(e) if attempt < total_attempts => {
                    tracing::warn!(
                        "⚠️ Failed to publish {}, retrying in {:?} (attempt {}/{}): {}",
                        message.message_id,
                        self.retry_delay,
                        attempt,
                        total_attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Failed to publish {} after {} attempts: {}",
                        message.message_id,
                        attempt,
                        e
                    );
                    return Err(DispatchError::Delivery {
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::transport::InMemoryTransport;
    use crate::workflow::types::{ProductUploadRequest, Workflow};

    fn dispatcher(transport: Arc<InMemoryTransport>, max_retries: u32) -> EventDispatcher {
        EventDispatcher::with_policy(
            transport,
            max_retries,
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
    }

    fn start_event() -> WorkflowEvent {
        WorkflowEvent::workflow_start(&Workflow::new(&ProductUploadRequest::default()))
    }

    #[tokio::test]
    async fn publishes_serialized_event_on_first_attempt() {
        let transport = Arc::new(InMemoryTransport::new());
        let event = start_event();

        dispatcher(Arc::clone(&transport), 3)
            .publish(&event, "workflow.start")
            .await
            .unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].routing_key, "workflow.start");
        assert_eq!(published[0].message_id, format!("{}-workflow.start", event.workflow_id));
        assert_eq!(published[0].event().unwrap(), event);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_next(3);

        dispatcher(Arc::clone(&transport), 3)
            .publish(&start_event(), "workflow.start")
            .await
            .unwrap();

        assert_eq!(transport.attempts(), 4);
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_error() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_next(10);

        let err = dispatcher(Arc::clone(&transport), 2)
            .publish(&start_event(), "workflow.start")
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Delivery { attempts: 3, .. }));
        assert!(err.to_string().contains("broker unavailable"));
        assert_eq!(transport.attempts(), 3);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn caller_deadline_cuts_slow_publish() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_latency(Duration::from_millis(200));

        let err = dispatcher(Arc::clone(&transport), 0)
            .publish_within(&start_event(), "workflow.start", Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Timeout { timeout_ms: 20 }));
    }
}
