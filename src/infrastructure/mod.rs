// Infrastructure module - background services and utilities
pub mod backoff;
pub mod heartbeat;
pub mod metrics;
pub mod task_manager;

pub use backoff::{BackoffPolicy, ReconnectSchedule};
pub use heartbeat::HeartbeatMonitor;
pub use metrics::{ConnectionEvent, ConnectionMetrics, EventKind, MetricsRecorder};
pub use task_manager::TaskManager;
