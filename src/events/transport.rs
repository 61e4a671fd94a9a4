/// Broker transports
///
/// `EventTransport` is the seam between the dispatcher and the broker. A
/// transport performs exactly one delivery attempt; retry policy lives in the
/// dispatcher.

use anyhow::Result;
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use crate::events::types::WorkflowEvent;

/// A serialized event ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub routing_key: String,
    pub message_id: String,
    pub content_type: &'static str,
    pub body: String,
}

impl OutboundMessage {
    /// Decode the body back into an event
    pub fn event(&self) -> serde_json::Result<WorkflowEvent> {
        serde_json::from_str(&self.body)
    }
}

#[async_trait]
pub trait EventTransport: Send + Sync + fmt::Debug {
    /// Single delivery attempt
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Redis streams transport
///
/// Appends each message to stream `<exchange>:<routing_key>` with `XADD`. Entries
/// persist until trimmed, so a downstream service that is restarting picks its
/// dispatches up from its consumer group instead of losing them. Each entry
/// carries `message_id`, `content_type` and `body` fields.
#[derive(Clone)]
pub struct RedisTransport {
    connection: redis::aio::ConnectionManager,
    exchange: String,
    stream_max_len: usize,
}

impl RedisTransport {
    /// Connect to Redis with an auto-reconnecting connection manager
    pub async fn connect(url: &str, exchange: &str, stream_max_len: usize) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            exchange: exchange.to_string(),
            stream_max_len,
        })
    }

    pub fn stream_key(&self, routing_key: &str) -> String {
        stream_key(&self.exchange, routing_key)
    }
}

fn stream_key(exchange: &str, routing_key: &str) -> String {
    format!("{}:{}", exchange, routing_key)
}

/// `XADD <stream> MAXLEN ~ <max_len> * message_id .. content_type .. body ..`
fn append_command(stream: &str, max_len: usize, message: &OutboundMessage) -> redis::Cmd {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream)
        .arg("MAXLEN")
        .arg("~")
        .arg(max_len)
        .arg("*")
        .arg("message_id")
        .arg(&message.message_id)
        .arg("content_type")
        .arg(message.content_type)
        .arg("body")
        .arg(&message.body);
    cmd
}

impl fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisTransport")
            .field("exchange", &self.exchange)
            .field("stream_max_len", &self.stream_max_len)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventTransport for RedisTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let mut connection = self.connection.clone();
        let stream = self.stream_key(&message.routing_key);

        let entry_id: String = append_command(&stream, self.stream_max_len, message)
            .query_async(&mut connection)
            .await?;

        tracing::debug!("📬 Appended {} to {} as {}", message.message_id, stream, entry_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis-streams"
    }
}

/// In-process transport for local runs without a broker
///
/// Keeps the most recent messages for inspection and can simulate broker
/// latency and transient outages.
#[derive(Debug)]
pub struct InMemoryTransport {
    published: Mutex<VecDeque<OutboundMessage>>,
    capacity: usize,
    pending_failures: AtomicU32,
    attempts: AtomicU32,
    latency_ms: AtomicU64,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            published: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            pending_failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make the next `count` delivery attempts fail
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Delay every delivery attempt
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Delivery attempts made so far, successful or not
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Routing keys of delivered messages, oldest first
    pub fn routing_keys(&self) -> Vec<String> {
        self.published().into_iter().map(|message| message.routing_key).collect()
    }

    /// Delivered messages decoded back into events; undecodable bodies are skipped
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.published()
            .iter()
            .filter_map(|message| message.event().ok())
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventTransport for InMemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.take_failure() {
            anyhow::bail!("broker unavailable (simulated)");
        }

        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if published.len() == self.capacity {
            published.pop_front();
        }
        published.push_back(message.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
