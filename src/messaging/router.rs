use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use super::EventBus;
use crate::client::ClientState;
use crate::infrastructure::MetricsRecorder;
use crate::types::constants::reserved_types;
use crate::types::Envelope;

/// Routes inbound envelopes: reserved types are special-cased, everything
/// else fans out through the event bus.
pub struct MessageRouter {
    state: Arc<RwLock<ClientState>>,
    bus: EventBus,
    metrics: Arc<Mutex<MetricsRecorder>>,
}

impl MessageRouter {
    pub(crate) fn new(
        state: Arc<RwLock<ClientState>>,
        bus: EventBus,
        metrics: Arc<Mutex<MetricsRecorder>>,
    ) -> Self {
        Self {
            state,
            bus,
            metrics,
        }
    }

    /// Route one parsed envelope.
    pub async fn route(&self, envelope: Envelope) {
        match envelope.kind.as_str() {
            reserved_types::PONG => self.handle_pong(&envelope).await,
            reserved_types::PING => self.handle_ping(&envelope).await,
            reserved_types::IDENTIFICATION | reserved_types::AUTH => {
                self.handle_identification(&envelope).await;
            }
            reserved_types::ERROR => {
                let details = envelope
                    .field("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("server error")
                    .to_string();
                tracing::warn!("Server error envelope: {details}");
                self.metrics.lock().unwrap().record_error(details.clone());
                self.bus.publish_error(details);
            }
            _ => {
                tracing::debug!("Routing inbound message of type {}", envelope.kind);
                self.bus.publish_message(envelope);
            }
        }
    }

    /// Forward a payload that failed envelope parsing. Logged, never dropped.
    pub fn route_raw(&self, payload: String) {
        tracing::warn!("Failed to parse inbound payload, forwarding raw: {payload}");
        self.bus.publish_raw(payload);
    }

    /// Match a pong against the most recent outstanding ping and fold the
    /// round trip into the latency window. Older unanswered pings were
    /// already abandoned, so a stale pong is ignored.
    async fn handle_pong(&self, envelope: &Envelope) {
        let pong_id = envelope.field("id").and_then(|v| v.as_u64());

        let mut state = self.state.write().await;
        let Some(pending) = state.pending_ping else {
            tracing::debug!("Pong with no outstanding ping, ignoring");
            return;
        };
        if pong_id != Some(pending.id) {
            tracing::debug!(
                "Stale pong (got {:?}, expected {}), ignoring",
                pong_id,
                pending.id
            );
            return;
        }

        state.pending_ping = None;
        drop(state);

        let latency = pending.sent_at.elapsed();
        tracing::debug!("Heartbeat round trip: {}ms", latency.as_millis());
        self.metrics.lock().unwrap().record_latency(latency);
    }

    /// Answer a server-initiated ping, echoing its id.
    async fn handle_ping(&self, envelope: &Envelope) {
        let pong = Envelope::pong(envelope.field("id"));
        let mut state = self.state.write().await;
        if let Some(transport) = state.transport.as_mut()
            && let Err(e) = transport.send(&pong, false).await
        {
            tracing::debug!("Failed to answer server ping: {e}");
        }
    }

    /// Adopt a server-assigned client id, if the envelope carries one.
    async fn handle_identification(&self, envelope: &Envelope) {
        if let Some(client_id) = envelope.field("clientId").and_then(|v| v.as_str()) {
            let mut state = self.state.write().await;
            if state.client_id != client_id {
                tracing::info!("Server assigned client id {client_id}");
                state.client_id = client_id.to_string();
            }
        }
    }
}
