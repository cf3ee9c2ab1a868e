use std::time::Instant;

use crate::infrastructure::{ReconnectSchedule, TaskManager};
use crate::messaging::MessageBuffer;
use crate::transport::Transport;

/// Logical state of the channel. Exactly one value is current at any time;
/// it changes only through recorded transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    UsingFallback,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::UsingFallback => "using_fallback",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The most recent outstanding ping. Older unanswered pings are abandoned,
/// never matched.
#[derive(Debug, Clone, Copy)]
pub struct PendingPing {
    pub id: u64,
    pub sent_at: Instant,
}

/// Consolidated mutable state for the channel.
///
/// Everything lives behind one `RwLock` so state transitions are strictly
/// serialized: no new transition starts before the previous one's event is
/// recorded.
pub struct ClientState {
    /// Current connection state
    pub(crate) connection_state: ConnectionState,

    /// The single active transport, if any
    pub(crate) transport: Option<Box<dyn Transport>>,

    /// Bumped whenever the transport is installed or torn down; background
    /// tasks carry the epoch they were started for and stand down on mismatch
    pub(crate) transport_epoch: u64,

    /// Opaque identity announced to the server; may be replaced by a
    /// server-assigned id
    pub(crate) client_id: String,

    /// Priority-ordered outbound queue
    pub(crate) buffer: MessageBuffer,

    /// Reconnection backoff schedule and attempt counter
    pub(crate) schedule: ReconnectSchedule,

    /// All background tasks (reader, heartbeat, reconnect timers, probes)
    pub(crate) task_manager: TaskManager,

    /// Most recent outstanding heartbeat ping
    pub(crate) pending_ping: Option<PendingPing>,

    /// Monotonic ping id source
    pub(crate) ping_counter: u64,

    /// Set by `disconnect()`; suppresses every form of automatic recovery
    pub(crate) was_manual_disconnect: bool,
}

impl ClientState {
    pub(crate) fn new(client_id: String, schedule: ReconnectSchedule) -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            transport: None,
            transport_epoch: 0,
            client_id,
            buffer: MessageBuffer::new(),
            schedule,
            task_manager: TaskManager::new(),
            pending_ping: None,
            ping_counter: 0,
            was_manual_disconnect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::UsingFallback.to_string(), "using_fallback");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
