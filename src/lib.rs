//! A resilient realtime channel for backends that drop connections.
//!
//! [`ResilientChannel`] keeps one logical bidirectional channel alive over a
//! WebSocket, reconnecting with exponential backoff when the socket fails and
//! failing over to HTTP polling once reconnect attempts are exhausted.
//! Outbound messages sent while no transport is usable are buffered in
//! priority order and drained on recovery; heartbeat pings detect silently
//! dead connections; every transition and error is observable through the
//! event bus and a bounded metrics log.
//!
//! # Quick start
//!
//! ```no_run
//! use resilient_channel::{
//!     ChannelNotice, ChannelOptions, Envelope, EventTag, ResilientChannel, SendOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = ResilientChannel::new(ChannelOptions {
//!     url: "wss://backend.example.com/channel".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let (_subscription, mut notices) = channel.subscribe(EventTag::Message("alert".to_string()));
//! channel.connect().await?;
//!
//! channel
//!     .send(
//!         Envelope::new("notification").with_field("body", "hello".into()),
//!         SendOptions::default(),
//!     )
//!     .await;
//!
//! while let Some(notice) = notices.recv().await {
//!     if let ChannelNotice::Message(envelope) = notice {
//!         println!("alert: {:?}", envelope.fields);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod transport;
pub mod types;

pub use client::{
    ChannelBuilder, ChannelOptions, ConnectionState, ResilientChannel, SendOptions, SendOutcome,
};
pub use infrastructure::{BackoffPolicy, ConnectionEvent, ConnectionMetrics, EventKind};
pub use messaging::{ChannelNotice, EventTag, Priority, Subscription};
pub use transport::{Transport, TransportEvent, TransportFactory, TransportType};
pub use types::{ChannelError, Envelope, Result};
