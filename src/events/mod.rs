/// Orchestration events
///
/// This module publishes typed workflow events to the external broker:
/// - Event envelope and routing keys
/// - Broker transports (Redis streams, in-process)
/// - Dispatcher with bounded retry and publish deadlines

// Event envelope, event categories and routing keys
pub mod types;

// Single-attempt delivery to a concrete broker
pub mod transport;

// Retry and deadline policy on top of a transport
pub mod dispatcher;

pub use dispatcher::EventDispatcher;
pub use transport::{EventTransport, InMemoryTransport, OutboundMessage, RedisTransport};
pub use types::{EventType, WorkflowEvent};
