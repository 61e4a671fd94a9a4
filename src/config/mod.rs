/// Configuration management for the pipeline orchestrator
///
/// Handles server configuration, broker connection and retry policy, and
/// notification hub sizing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Event broker configuration
    pub broker: BrokerConfig,
    /// Real-time notification hub configuration
    pub hub: HubConfig,
    /// Default log filter when RUST_LOG is not set (e.g., "info", "debug")
    pub log_level: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Event broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Redis connection URL. When absent, events stay in-process.
    pub redis_url: Option<String>,
    /// Stream key prefix shared by every routing key (e.g., "product_workflow")
    pub exchange: String,
    /// Approximate cap on entries kept per stream (`XADD MAXLEN ~`)
    pub stream_max_len: usize,
    /// Additional attempts after the first failed publish
    pub max_retries: u32,
    /// Fixed delay between publish attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Deadline for a whole publish including retries, in milliseconds
    pub publish_timeout_ms: u64,
}

/// Notification hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Outbound buffer size per observer; a full buffer drops the observer
    pub observer_buffer: usize,
}

impl BrokerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            exchange: "product_workflow".to_string(),
            stream_max_len: 10_000,
            max_retries: 3,
            retry_delay_ms: 1000,
            publish_timeout_ms: 10_000,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { observer_buffer: 256 }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        let broker_defaults = BrokerConfig::default();
        let hub_defaults = HubConfig::default();

        Self {
            server: ServerConfig {
                host: std::env::var("PIPELINE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("PIPELINE_PORT", 8080),
            },
            broker: BrokerConfig {
                redis_url: std::env::var("PIPELINE_REDIS_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty()),
                exchange: std::env::var("PIPELINE_EXCHANGE")
                    .unwrap_or(broker_defaults.exchange),
                stream_max_len: env_or("PIPELINE_STREAM_MAX_LEN", broker_defaults.stream_max_len),
                max_retries: env_or("PIPELINE_PUBLISH_MAX_RETRIES", broker_defaults.max_retries),
                retry_delay_ms: env_or("PIPELINE_PUBLISH_RETRY_DELAY_MS", broker_defaults.retry_delay_ms),
                publish_timeout_ms: env_or("PIPELINE_PUBLISH_TIMEOUT_MS", broker_defaults.publish_timeout_ms),
            },
            hub: HubConfig {
                observer_buffer: env_or("PIPELINE_OBSERVER_BUFFER", hub_defaults.observer_buffer),
            },
            log_level: std::env::var("PIPELINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Parse an environment variable, falling back when unset or malformed
fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_defaults_match_documented_policy() {
        let broker = BrokerConfig::default();
        assert_eq!(broker.exchange, "product_workflow");
        assert_eq!(broker.stream_max_len, 10_000);
        assert_eq!(broker.max_retries, 3);
        assert_eq!(broker.retry_delay(), Duration::from_secs(1));
        assert_eq!(broker.publish_timeout(), Duration::from_secs(10));
        assert!(broker.redis_url.is_none());
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        assert_eq!(env_or("PIPELINE_TEST_UNSET_VARIABLE", 42u16), 42);
    }
}
