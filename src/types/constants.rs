/// Reserved envelope types (magic strings layer)
pub mod reserved_types {
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const IDENTIFICATION: &str = "identification";
    pub const AUTH: &str = "auth";
    pub const ERROR: &str = "error";
}

/// Default connection-attempt timeout (milliseconds)
pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 10_000;

/// Default heartbeat interval (milliseconds)
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 25_000;

/// Default time to wait for a pong before declaring the connection dead (milliseconds)
pub const DEFAULT_PING_TIMEOUT: u64 = 10_000;

/// Default reconnection backoff parameters
pub const DEFAULT_RECONNECT_BASE_DELAY: u64 = 1_000;
pub const DEFAULT_RECONNECT_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_RECONNECT_MAX_DELAY: u64 = 30_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default polling fallback intervals (milliseconds)
pub const DEFAULT_FALLBACK_POLLING_INTERVAL: u64 = 3_000;
pub const DEFAULT_FALLBACK_PROBE_INTERVAL: u64 = 30_000;

/// Default per-message retry budget
pub const DEFAULT_MAX_SEND_RETRIES: u32 = 3;

/// Connection event ring capacity
pub const EVENT_LOG_CAPACITY: usize = 50;

/// Heartbeat latency rolling-window size
pub const LATENCY_WINDOW_SIZE: usize = 100;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
pub const WS_CLOSE_GOING_AWAY: u16 = 1001;
pub const WS_CLOSE_ABNORMAL: u16 = 1006;

/// Application close codes (4000-4999 is the private-use range)
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;
pub const CLOSE_AUTH_REJECTED: u16 = 4003;
