use thiserror::Error;

/// Errors that can occur when using the resilient channel.
///
/// Transport and timer failures are handled internally by the reconnection
/// machinery and never surface from [`send()`](crate::ResilientChannel::send)
/// or [`connect()`](crate::ResilientChannel::connect); only configuration
/// problems reject those calls.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// WebSocket protocol error (handshake failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Opening a transport failed before the connection was confirmed
    #[error("transport open failed: {0}")]
    TransportOpen(String),

    /// The transport closed underneath us
    #[error("transport closed (code {code}): {reason}")]
    TransportClosed { code: u16, reason: String },

    /// Sending a payload over the active transport failed
    #[error("send failed: {0}")]
    Send(String),

    /// The polling fallback endpoint rejected our credentials
    #[error("fallback authentication rejected: {0}")]
    FallbackAuth(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (polling fallback)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A connection attempt exceeded the configured timeout
    #[error("connection attempt timed out")]
    Timeout,

    /// Invalid configuration (the only rejection path of `connect()`)
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience type alias for `Result<T, ChannelError>`.
pub type Result<T> = std::result::Result<T, ChannelError>;
