// Transport module - one interface over two dissimilar transports
pub mod factory;
pub mod polling;
pub mod websocket;

pub use factory::{NetTransportFactory, TransportFactory};
pub use polling::{PollingTransport, ws_to_http_endpoint};
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{Envelope, Result};

/// Which adapter currently serves traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Socket,
    Polling,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events a transport delivers to its owner after a successful open.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A parsed inbound envelope.
    Message(Envelope),
    /// An inbound payload that failed envelope parsing; forwarded, not dropped.
    Raw(String),
    /// A recoverable transport error; the transport keeps running.
    Error(String),
    /// The transport is gone. Always the last event on the stream.
    Closed { code: u16, reason: String },
}

/// One transport kind behind an identical open/send/close/events interface,
/// so the state machine swaps socket and polling without special-casing.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportType;

    /// Establish the connection. Resolves once the transport is usable;
    /// inbound traffic and closure arrive on the returned receiver.
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Send one envelope. `binary` selects binary framing where the
    /// transport distinguishes (payloads are JSON-encoded either way).
    async fn send(&mut self, envelope: &Envelope, binary: bool) -> Result<()>;

    /// Close with the given close code, cancelling any in-flight work. No
    /// `Closed` event is emitted for a locally initiated close.
    async fn close(&mut self, code: u16) -> Result<()>;

    fn is_open(&self) -> bool;
}
