use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use crate::client::ConnectionState;
use crate::types::constants::{EVENT_LOG_CAPACITY, LATENCY_WINDOW_SIZE};

/// Kind of a recorded connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StatusChange,
    FallbackActivated,
    FallbackDeactivated,
    ReconnectAttempt,
    Error,
}

/// One immutable entry in the bounded connection-event log.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub timestamp: SystemTime,
    pub kind: EventKind,
    pub details: String,
}

/// Point-in-time aggregate view of connection health.
#[derive(Debug, Clone)]
pub struct ConnectionMetrics {
    pub total_reconnect_attempts: u64,
    pub total_fallback_activations: u64,
    pub total_errors: u64,
    pub average_reconnect_time: Option<Duration>,
    pub average_latency: Option<Duration>,
    pub last_error: Option<String>,
    pub recent_events: Vec<ConnectionEvent>,
}

/// Bounded, append-only event log plus incrementally maintained aggregates.
///
/// All writes go through explicit `record_*`/`mark_*` calls made by the state
/// machine and scheduler; [`snapshot`](Self::snapshot) never mutates.
pub struct MetricsRecorder {
    capacity: usize,
    events: VecDeque<ConnectionEvent>,
    total_reconnect_attempts: u64,
    total_fallback_activations: u64,
    total_errors: u64,
    reconnect_total: Duration,
    reconnect_samples: u64,
    disconnected_since: Option<Instant>,
    latency_window: VecDeque<Duration>,
    last_error: Option<String>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
            total_reconnect_attempts: 0,
            total_fallback_activations: 0,
            total_errors: 0,
            reconnect_total: Duration::ZERO,
            reconnect_samples: 0,
            disconnected_since: None,
            latency_window: VecDeque::with_capacity(LATENCY_WINDOW_SIZE),
            last_error: None,
        }
    }

    pub fn record_status_change(&mut self, from: ConnectionState, to: ConnectionState) {
        self.push_event(EventKind::StatusChange, format!("{from} -> {to}"));
    }

    pub fn record_reconnect_attempt(&mut self, attempt: u32, delay: Duration) {
        self.total_reconnect_attempts += 1;
        self.push_event(
            EventKind::ReconnectAttempt,
            format!("attempt {attempt} in {}ms", delay.as_millis()),
        );
    }

    pub fn record_fallback_activated(&mut self) {
        self.total_fallback_activations += 1;
        self.push_event(EventKind::FallbackActivated, "polling fallback".to_string());
    }

    pub fn record_fallback_deactivated(&mut self) {
        self.push_event(
            EventKind::FallbackDeactivated,
            "socket restored".to_string(),
        );
    }

    pub fn record_error(&mut self, details: impl Into<String>) {
        let details = details.into();
        self.total_errors += 1;
        self.last_error = Some(details.clone());
        self.push_event(EventKind::Error, details);
    }

    /// Fold a heartbeat round-trip sample into the rolling window.
    pub fn record_latency(&mut self, latency: Duration) {
        if self.latency_window.len() == LATENCY_WINDOW_SIZE {
            self.latency_window.pop_front();
        }
        self.latency_window.push_back(latency);
    }

    /// The channel left Connected; start the reconnect-duration clock unless
    /// one is already running.
    pub fn mark_disconnected(&mut self) {
        if self.disconnected_since.is_none() {
            self.disconnected_since = Some(Instant::now());
        }
    }

    /// The channel entered Connected; close out any running reconnect clock.
    pub fn mark_connected(&mut self) {
        if let Some(since) = self.disconnected_since.take() {
            self.reconnect_total += since.elapsed();
            self.reconnect_samples += 1;
        }
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            total_reconnect_attempts: self.total_reconnect_attempts,
            total_fallback_activations: self.total_fallback_activations,
            total_errors: self.total_errors,
            average_reconnect_time: (self.reconnect_samples > 0)
                .then(|| self.reconnect_total / self.reconnect_samples as u32),
            average_latency: (!self.latency_window.is_empty()).then(|| {
                self.latency_window.iter().sum::<Duration>() / self.latency_window.len() as u32
            }),
            last_error: self.last_error.clone(),
            recent_events: self.events.iter().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, details: String) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(ConnectionEvent {
            timestamp: SystemTime::now(),
            kind,
            details,
        });
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ring_evicts_oldest() {
        let mut recorder = MetricsRecorder::with_capacity(3);
        for i in 0..5 {
            recorder.record_error(format!("error {i}"));
        }

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.recent_events.len(), 3);
        assert_eq!(snapshot.recent_events[0].details, "error 2");
        assert_eq!(snapshot.recent_events[2].details, "error 4");
        assert_eq!(snapshot.total_errors, 5);
        assert_eq!(snapshot.last_error.as_deref(), Some("error 4"));
    }

    #[test]
    fn test_reconnect_attempts_counted() {
        let mut recorder = MetricsRecorder::new();
        recorder.record_reconnect_attempt(1, Duration::from_millis(100));
        recorder.record_reconnect_attempt(2, Duration::from_millis(200));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_reconnect_attempts, 2);
        assert_eq!(snapshot.recent_events.len(), 2);
        assert!(snapshot.recent_events[1].details.contains("200ms"));
    }

    #[test]
    fn test_latency_window_bounded() {
        let mut recorder = MetricsRecorder::new();
        for _ in 0..150 {
            recorder.record_latency(Duration::from_millis(10));
        }
        recorder.record_latency(Duration::from_millis(10));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.average_latency, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_average_reconnect_time_requires_samples() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.snapshot().average_reconnect_time, None);
    }

    #[test]
    fn test_mark_disconnected_is_idempotent_until_connected() {
        let mut recorder = MetricsRecorder::new();
        recorder.mark_disconnected();
        recorder.mark_disconnected();
        recorder.mark_connected();

        let snapshot = recorder.snapshot();
        assert!(snapshot.average_reconnect_time.is_some());

        // No clock running: another mark_connected adds no sample.
        recorder.mark_connected();
        assert_eq!(
            recorder.snapshot().average_reconnect_time,
            snapshot.average_reconnect_time
        );
    }
}
