use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use url::Url;

use super::core::ResilientChannel;
use super::state::ClientState;
use crate::infrastructure::{BackoffPolicy, MetricsRecorder, ReconnectSchedule};
use crate::messaging::EventBus;
use crate::transport::{NetTransportFactory, TransportFactory};
use crate::types::constants::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_FALLBACK_POLLING_INTERVAL,
    DEFAULT_FALLBACK_PROBE_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_MAX_SEND_RETRIES, DEFAULT_PING_TIMEOUT, DEFAULT_RECONNECT_BASE_DELAY,
    DEFAULT_RECONNECT_MAX_DELAY, DEFAULT_RECONNECT_MULTIPLIER,
};
use crate::types::{ChannelError, Result};

/// Configuration for a [`ResilientChannel`]. Every knob has a default; only
/// `url` is required.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Transport endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Client identity; generated locally when `None`
    pub client_id: Option<String>,
    /// Reconnect automatically on abnormal closure
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Backoff base delay (milliseconds)
    pub reconnect_base_delay: u64,
    pub reconnect_multiplier: f64,
    /// Backoff delay ceiling (milliseconds)
    pub reconnect_max_delay: u64,
    /// Ping cadence while Connected (milliseconds)
    pub heartbeat_interval: u64,
    /// How long to wait for a pong (milliseconds)
    pub ping_timeout: u64,
    /// Bound on each Connecting phase (milliseconds)
    pub connection_timeout: u64,
    /// Fail over to HTTP polling once reconnect attempts are exhausted
    pub fallback_polling: bool,
    /// GET poll cadence while on the fallback (milliseconds)
    pub fallback_polling_interval: u64,
    /// Socket recovery probe cadence while on the fallback (milliseconds)
    pub fallback_probe_interval: u64,
    /// Per-message retry budget for buffered sends
    pub max_send_retries: u32,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            client_id: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            reconnect_multiplier: DEFAULT_RECONNECT_MULTIPLIER,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            fallback_polling: true,
            fallback_polling_interval: DEFAULT_FALLBACK_POLLING_INTERVAL,
            fallback_probe_interval: DEFAULT_FALLBACK_PROBE_INTERVAL,
            max_send_retries: DEFAULT_MAX_SEND_RETRIES,
        }
    }
}

/// Builder for [`ResilientChannel`]. Validates configuration up front; this
/// is the only place a channel can fail before any I/O happens.
pub struct ChannelBuilder {
    options: ChannelOptions,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl ChannelBuilder {
    /// Create a builder, rejecting invalid configuration.
    pub fn new(options: ChannelOptions) -> Result<Self> {
        if options.url.is_empty() {
            return Err(ChannelError::Config("transport URL is required".to_string()));
        }
        let url = Url::parse(&options.url)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ChannelError::Config(format!(
                "transport URL must be ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        if options.reconnect_multiplier < 1.0 {
            return Err(ChannelError::Config(
                "reconnect_multiplier must be >= 1.0".to_string(),
            ));
        }
        if options.reconnect_base_delay == 0 || options.reconnect_max_delay == 0 {
            return Err(ChannelError::Config(
                "reconnect delays must be positive".to_string(),
            ));
        }
        if options.heartbeat_interval == 0
            || options.ping_timeout == 0
            || options.connection_timeout == 0
            || options.fallback_polling_interval == 0
            || options.fallback_probe_interval == 0
        {
            return Err(ChannelError::Config(
                "intervals and timeouts must be positive".to_string(),
            ));
        }

        Ok(Self {
            options,
            factory: None,
        })
    }

    /// Inject a custom transport factory (tests, instrumentation).
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the channel. No connection is made until `connect()`.
    pub fn build(self) -> ResilientChannel {
        let client_id = self
            .options
            .client_id
            .clone()
            .unwrap_or_else(generate_client_id);

        let policy = BackoffPolicy {
            base_delay_ms: self.options.reconnect_base_delay,
            multiplier: self.options.reconnect_multiplier,
            max_delay_ms: self.options.reconnect_max_delay,
            max_attempts: self.options.max_reconnect_attempts,
        };

        ResilientChannel {
            options: Arc::new(self.options),
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(NetTransportFactory)),
            bus: EventBus::new(),
            metrics: Arc::new(Mutex::new(MetricsRecorder::new())),
            state: Arc::new(RwLock::new(ClientState::new(
                client_id,
                ReconnectSchedule::new(policy),
            ))),
        }
    }
}

fn generate_client_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("client_{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        let result = ChannelBuilder::new(ChannelOptions::default());
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[test]
    fn test_rejects_http_scheme() {
        let options = ChannelOptions {
            url: "https://example.com/rt".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ChannelBuilder::new(options),
            Err(ChannelError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_url() {
        let options = ChannelOptions {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ChannelBuilder::new(options),
            Err(ChannelError::UrlParse(_))
        ));
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let options = ChannelOptions {
            url: "wss://example.com/rt".to_string(),
            reconnect_multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            ChannelBuilder::new(options),
            Err(ChannelError::Config(_))
        ));
    }

    #[test]
    fn test_accepts_valid_options() {
        let options = ChannelOptions {
            url: "wss://example.com/rt".to_string(),
            ..Default::default()
        };
        assert!(ChannelBuilder::new(options).is_ok());
    }

    #[tokio::test]
    async fn test_generated_client_ids_are_unique_per_instance() {
        let options = ChannelOptions {
            url: "wss://example.com/rt".to_string(),
            ..Default::default()
        };
        let a = ChannelBuilder::new(options.clone()).unwrap().build();
        let b = ChannelBuilder::new(options).unwrap().build();
        assert!(a.client_id().await.starts_with("client_"));
        assert_ne!(a.client_id().await, b.client_id().await);
    }

    #[tokio::test]
    async fn test_configured_client_id_is_kept() {
        let options = ChannelOptions {
            url: "wss://example.com/rt".to_string(),
            client_id: Some("desk-7".to_string()),
            ..Default::default()
        };
        let channel = ChannelBuilder::new(options).unwrap().build();
        assert_eq!(channel.client_id().await, "desk-7");
    }
}
