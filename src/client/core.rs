use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use tokio::time::sleep;

use super::builder::{ChannelBuilder, ChannelOptions};
use super::state::{ClientState, ConnectionState, PendingPing};
use crate::infrastructure::{HeartbeatMonitor, MetricsRecorder};
use crate::infrastructure::metrics::ConnectionMetrics;
use crate::messaging::{
    BufferedMessage, ChannelNotice, EventBus, EventTag, MessageRouter, Priority, Subscription,
};
use crate::transport::{Transport, TransportEvent, TransportFactory, TransportType};
use crate::types::constants::{
    CLOSE_AUTH_REJECTED, CLOSE_HEARTBEAT_TIMEOUT, WS_CLOSE_GOING_AWAY, WS_CLOSE_NORMAL,
};
use crate::types::{ChannelError, Envelope, Result};

/// Per-send options.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub priority: Priority,
    /// Overrides the channel-wide retry budget when set
    pub max_retries: Option<u32>,
    /// Binary framing hint (payloads are JSON-encoded either way)
    pub binary: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            max_retries: None,
            binary: false,
        }
    }
}

/// What happened to a `send()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered to the active transport
    Sent,
    /// Queued for delivery once a transport opens
    Buffered,
}

/// Outcome of one heartbeat ping, consumed by the monitor loop.
pub(crate) enum PingOutcome {
    Sent(u64),
    SendFailed,
    Stale,
}

/// Which path asked for a connection attempt; decides how a failure is
/// escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptPhase {
    /// `connect()` / `reconnect()`
    Initial,
    /// Scheduled backoff retry; the channel stays in Reconnecting
    Retry,
    /// Polling fallback activation; failure here is terminal
    Fallback,
}

/// A resilient, always-available realtime channel.
///
/// `ResilientChannel` keeps one logical bidirectional channel alive over
/// transports that are frequently interrupted: it reconnects with exponential
/// backoff, fails over to HTTP polling once attempts are exhausted, detects
/// silently dead connections via heartbeats, buffers outbound messages while
/// no transport is usable, and reports every transition through its metrics
/// recorder and event bus.
///
/// # Example
///
/// ```no_run
/// use resilient_channel::{ChannelOptions, Envelope, EventTag, ResilientChannel, SendOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = ResilientChannel::new(ChannelOptions {
///     url: "wss://backend.example.com/channel".to_string(),
///     ..Default::default()
/// })?;
///
/// let (_subscription, mut notices) = channel.subscribe(EventTag::AnyMessage);
/// channel.connect().await?;
///
/// channel
///     .send(Envelope::new("notification"), SendOptions::default())
///     .await;
///
/// while let Some(notice) = notices.recv().await {
///     println!("{notice:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResilientChannel {
    pub(crate) options: Arc<ChannelOptions>,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) bus: EventBus,
    pub(crate) metrics: Arc<Mutex<MetricsRecorder>>,
    pub(crate) state: Arc<RwLock<ClientState>>,
}

impl ResilientChannel {
    /// Create a channel. No connection is made until [`connect()`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] or [`ChannelError::UrlParse`] for
    /// invalid configuration; nothing else can fail here.
    pub fn new(options: ChannelOptions) -> Result<Self> {
        ChannelBuilder::new(options).map(|builder| builder.build())
    }

    /// Establish the socket transport.
    ///
    /// Idempotent: a no-op returning `Ok(true)` while Connected and
    /// `Ok(false)` while an attempt is already in flight. Resolves `true` on
    /// confirmed open. A failed attempt is handed to the reconnection
    /// scheduler (or parks the channel in Errored when auto-reconnect is
    /// off) and resolves `Ok(false)`; transport errors are never thrown at
    /// the caller.
    pub async fn connect(&self) -> Result<bool> {
        {
            let mut st = self.state.write().await;
            match st.connection_state {
                ConnectionState::Connected => return Ok(true),
                ConnectionState::Connecting => return Ok(false),
                _ => {}
            }

            // Supersede whatever was live: fallback transport, probe loops,
            // pending reconnect timers.
            st.task_manager.abort_all();
            if let Some(mut transport) = st.transport.take() {
                let _ = transport.close(WS_CLOSE_NORMAL).await;
            }
            st.transport_epoch += 1;
            st.pending_ping = None;
            st.was_manual_disconnect = false;
            self.transition(&mut st, ConnectionState::Connecting);
        }

        self.start_attempt(TransportType::Socket, AttemptPhase::Initial)
            .await
    }

    /// Manual reconnect: cancel any in-flight timer or attempt, reset the
    /// backoff counter to zero, and issue an immediate socket attempt.
    pub async fn reconnect(&self) -> Result<bool> {
        {
            let mut st = self.state.write().await;
            st.task_manager.abort_all();
            if let Some(mut transport) = st.transport.take() {
                let _ = transport.close(WS_CLOSE_NORMAL).await;
            }
            st.transport_epoch += 1;
            st.pending_ping = None;
            st.schedule.reset();
            st.was_manual_disconnect = false;
            self.transition(&mut st, ConnectionState::Connecting);
        }

        self.start_attempt(TransportType::Socket, AttemptPhase::Initial)
            .await
    }

    /// Tear the channel down: cancel every pending timer and task, close the
    /// transport with a normal close code, transition to Disconnected, and
    /// schedule nothing further.
    pub async fn disconnect(&self) -> Result<()> {
        let mut st = self.state.write().await;
        if st.connection_state == ConnectionState::Disconnected && st.transport.is_none() {
            return Ok(());
        }

        tracing::info!("Disconnecting channel");
        st.was_manual_disconnect = true;
        st.task_manager.abort_all();
        st.pending_ping = None;
        if let Some(mut transport) = st.transport.take() {
            let _ = transport.close(WS_CLOSE_NORMAL).await;
        }
        st.transport_epoch += 1;
        self.transition(&mut st, ConnectionState::Disconnected);
        Ok(())
    }

    /// Send an envelope. Never fails for a disconnected channel: with no
    /// usable transport (or on send failure) the message is buffered and
    /// drained, priority-then-FIFO, once a transport opens.
    pub async fn send(&self, envelope: Envelope, options: SendOptions) -> SendOutcome {
        let max_retries = options.max_retries.unwrap_or(self.options.max_send_retries);
        let mut st = self.state.write().await;

        let usable = st.transport.as_ref().is_some_and(|t| t.is_open());
        if usable {
            let ClientState { transport, .. } = &mut *st;
            if let Some(transport) = transport.as_mut() {
                match transport.send(&envelope, options.binary).await {
                    Ok(()) => return SendOutcome::Sent,
                    Err(e) => tracing::warn!("Send failed, buffering for retry: {e}"),
                }
            }
        }

        st.buffer.enqueue(BufferedMessage::new(
            envelope,
            options.priority,
            max_retries,
            options.binary,
        ));
        tracing::debug!("Buffered outbound message ({} queued)", st.buffer.len());
        SendOutcome::Buffered
    }

    /// Register interest in channel events. The subscription token releases
    /// the listener when dropped.
    pub fn subscribe(&self, tag: EventTag) -> (Subscription, mpsc::Receiver<ChannelNotice>) {
        self.bus.subscribe(tag)
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.connection_state
    }

    /// Which transport currently serves traffic, if any.
    pub async fn transport_type(&self) -> Option<TransportType> {
        self.state.read().await.transport.as_ref().map(|t| t.kind())
    }

    /// Point-in-time metrics snapshot. Never mutates.
    pub fn metrics(&self) -> ConnectionMetrics {
        self.metrics.lock().unwrap().snapshot()
    }

    /// The channel's identity as announced to the server.
    pub async fn client_id(&self) -> String {
        self.state.read().await.client_id.clone()
    }

    /// True while either transport (socket or fallback) is serving traffic.
    pub async fn is_connected(&self) -> bool {
        matches!(
            self.state.read().await.connection_state,
            ConnectionState::Connected | ConnectionState::UsingFallback
        )
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    // ---- state machine internals ----

    /// The only place `connection_state` changes. Callers hold the state
    /// write lock, so transitions are strictly serialized and each emits
    /// exactly one StatusChange event, synchronously. A same-state
    /// transition emits nothing.
    fn transition(&self, st: &mut ClientState, to: ConnectionState) {
        let from = st.connection_state;
        if from == to {
            return;
        }
        st.connection_state = to;
        tracing::info!("Connection state: {from} -> {to}");

        {
            let mut metrics = self.metrics.lock().unwrap();
            metrics.record_status_change(from, to);
            match to {
                ConnectionState::Connected => metrics.mark_connected(),
                ConnectionState::Disconnected
                | ConnectionState::Errored
                | ConnectionState::Reconnecting => metrics.mark_disconnected(),
                _ => {}
            }
        }
        self.bus.publish_state(from, to);
    }

    /// Open a transport of the given kind and install it. Each attempt is
    /// independently bounded by the connection timeout. Exactly one attempt
    /// is ever live: a disconnect/reconnect during the open bumps the epoch
    /// and the late transport is discarded.
    async fn start_attempt(&self, kind: TransportType, phase: AttemptPhase) -> Result<bool> {
        let (epoch_at_start, client_id) = {
            let st = self.state.read().await;
            (st.transport_epoch, st.client_id.clone())
        };

        let mut transport = self.factory.create(kind, &self.options, &client_id);
        let budget = Duration::from_millis(self.options.connection_timeout);

        let open_result = tokio::time::timeout(budget, transport.open()).await;

        let mut st = self.state.write().await;
        if st.transport_epoch != epoch_at_start || st.was_manual_disconnect {
            drop(st);
            tracing::debug!("Connect attempt superseded, discarding transport");
            let _ = transport.close(WS_CLOSE_NORMAL).await;
            return Ok(false);
        }

        match open_result {
            Ok(Ok(events)) => {
                self.install_transport(&mut st, transport, events, kind).await;
                Ok(true)
            }
            Ok(Err(e)) => {
                self.handle_attempt_failure(&mut st, phase, e);
                Ok(false)
            }
            Err(_elapsed) => {
                self.handle_attempt_failure(&mut st, phase, ChannelError::Timeout);
                Ok(false)
            }
        }
    }

    /// Wire up a freshly opened transport: identification, reader task, and
    /// either heartbeat (socket) or recovery probe (fallback), then drain
    /// the outbound buffer.
    async fn install_transport(
        &self,
        st: &mut ClientState,
        mut transport: Box<dyn Transport>,
        events: mpsc::Receiver<TransportEvent>,
        kind: TransportType,
    ) {
        let identification = Envelope::identification(&st.client_id);
        if let Err(e) = transport.send(&identification, false).await {
            tracing::warn!("Failed to send identification: {e}");
        }

        st.transport_epoch += 1;
        let epoch = st.transport_epoch;
        st.transport = Some(transport);
        st.pending_ping = None;

        let channel = self.clone();
        let router = MessageRouter::new(
            Arc::clone(&self.state),
            self.bus.clone(),
            Arc::clone(&self.metrics),
        );
        st.task_manager.spawn(async move {
            channel.read_events(router, events, epoch).await;
        });

        match kind {
            TransportType::Socket => {
                self.transition(st, ConnectionState::Connected);
                st.schedule.reset();
                let monitor = HeartbeatMonitor::new(self.clone(), epoch);
                st.task_manager.spawn(monitor.run());
            }
            TransportType::Polling => {
                self.transition(st, ConnectionState::UsingFallback);
                self.metrics.lock().unwrap().record_fallback_activated();
                st.task_manager.spawn(self.probe_loop());
            }
        }

        self.drain_buffer_locked(st).await;
    }

    fn handle_attempt_failure(&self, st: &mut ClientState, phase: AttemptPhase, error: ChannelError) {
        tracing::error!("Transport open failed: {error}");
        self.metrics.lock().unwrap().record_error(error.to_string());
        self.bus.publish_error(error.to_string());

        match phase {
            // The fallback itself could not come up; nothing left to try.
            AttemptPhase::Fallback => self.transition(st, ConnectionState::Errored),
            AttemptPhase::Initial | AttemptPhase::Retry => {
                if self.options.auto_reconnect {
                    self.schedule_next_attempt(st);
                } else {
                    self.transition(st, ConnectionState::Errored);
                }
            }
        }
    }

    /// Claim the next backoff slot and arm its timer, or escalate to the
    /// fallback / Errored once the attempt budget is spent. The attempt is
    /// counted and recorded before `connect` logic runs.
    fn schedule_next_attempt(&self, st: &mut ClientState) {
        match st.schedule.next() {
            Some(delay) => {
                let attempt = st.schedule.attempts();
                self.transition(st, ConnectionState::Reconnecting);
                self.metrics
                    .lock()
                    .unwrap()
                    .record_reconnect_attempt(attempt, delay);
                tracing::info!(
                    "Scheduling reconnect attempt {attempt} in {}ms",
                    delay.as_millis()
                );

                let channel = self.clone();
                st.task_manager.spawn(async move {
                    sleep(delay).await;
                    channel.run_scheduled_attempt().await;
                });
            }
            None if self.options.fallback_polling => {
                tracing::warn!("Reconnect attempts exhausted, activating polling fallback");
                let channel = self.clone();
                st.task_manager.spawn(async move {
                    channel.activate_fallback().await;
                });
            }
            None => {
                tracing::error!("Reconnect attempts exhausted and fallback disabled");
                self.transition(st, ConnectionState::Errored);
            }
        }
    }

    async fn run_scheduled_attempt(&self) {
        {
            let st = self.state.read().await;
            if st.connection_state != ConnectionState::Reconnecting || st.was_manual_disconnect {
                return;
            }
        }
        let _ = self
            .start_attempt(TransportType::Socket, AttemptPhase::Retry)
            .await;
    }

    async fn activate_fallback(&self) {
        {
            let st = self.state.read().await;
            if st.was_manual_disconnect {
                return;
            }
        }
        let _ = self
            .start_attempt(TransportType::Polling, AttemptPhase::Fallback)
            .await;
    }

    /// While on the fallback, periodically try to bring the socket back.
    /// Deliberately not backoff-driven: a plain fixed-interval cycle,
    /// independent of the primary schedule's counter.
    ///
    /// Boxed rather than an `async fn`: the loop awaits
    /// [`install_transport`](Self::install_transport), which in turn spawns
    /// the loop for a fresh fallback, and that recursion needs a type-erased
    /// future.
    fn probe_loop(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let channel = self.clone();
        Box::pin(async move { channel.run_probe_loop().await })
    }

    async fn run_probe_loop(&self) {
        let probe_interval = Duration::from_millis(self.options.fallback_probe_interval);
        let budget = Duration::from_millis(self.options.connection_timeout);

        loop {
            sleep(probe_interval).await;
            {
                let st = self.state.read().await;
                if st.connection_state != ConnectionState::UsingFallback
                    || st.was_manual_disconnect
                {
                    break;
                }
            }

            tracing::debug!("Probing for socket recovery");
            let client_id = self.client_id().await;
            let mut transport =
                self.factory
                    .create(TransportType::Socket, &self.options, &client_id);

            match tokio::time::timeout(budget, transport.open()).await {
                Ok(Ok(events)) => {
                    let mut st = self.state.write().await;
                    if st.connection_state != ConnectionState::UsingFallback
                        || st.was_manual_disconnect
                    {
                        drop(st);
                        let _ = transport.close(WS_CLOSE_NORMAL).await;
                        break;
                    }
                    tracing::info!("Socket recovered, leaving polling fallback");
                    if let Some(mut polling) = st.transport.take() {
                        let _ = polling.close(WS_CLOSE_NORMAL).await;
                    }
                    self.transition(&mut st, ConnectionState::Connecting);
                    self.metrics.lock().unwrap().record_fallback_deactivated();
                    self.install_transport(&mut st, transport, events, TransportType::Socket)
                        .await;
                    break;
                }
                Ok(Err(e)) => tracing::debug!("Socket probe failed: {e}"),
                Err(_) => tracing::debug!("Socket probe timed out"),
            }
        }
    }

    /// Forward transport events until the transport goes away. `epoch` pins
    /// this reader to the transport it was started for.
    async fn read_events(
        &self,
        router: MessageRouter,
        mut events: mpsc::Receiver<TransportEvent>,
        epoch: u64,
    ) {
        while let Some(event) = events.recv().await {
            {
                let st = self.state.read().await;
                if st.transport_epoch != epoch {
                    break;
                }
            }
            match event {
                TransportEvent::Message(envelope) => router.route(envelope).await,
                TransportEvent::Raw(payload) => router.route_raw(payload),
                TransportEvent::Error(details) => {
                    tracing::warn!("Transport error: {details}");
                    self.metrics.lock().unwrap().record_error(details.clone());
                    self.bus.publish_error(details);
                }
                TransportEvent::Closed { code, reason } => {
                    self.handle_transport_closed(epoch, code, reason).await;
                    break;
                }
            }
        }
        tracing::debug!("Transport reader finished");
    }

    /// React to the transport going away underneath us. Normal closure is
    /// terminal; anything else consults the reconnection scheduler.
    async fn handle_transport_closed(&self, epoch: u64, code: u16, reason: String) {
        let mut st = self.state.write().await;
        if st.transport_epoch != epoch || st.was_manual_disconnect {
            return;
        }

        if let Some(mut transport) = st.transport.take() {
            let _ = transport.close(code).await;
        }
        st.transport_epoch += 1;
        st.pending_ping = None;

        if code == WS_CLOSE_NORMAL || code == WS_CLOSE_GOING_AWAY {
            tracing::info!("Transport closed normally (code {code})");
            self.transition(&mut st, ConnectionState::Disconnected);
            return;
        }

        let details = ChannelError::TransportClosed { code, reason }.to_string();
        tracing::warn!("{details}");
        self.metrics.lock().unwrap().record_error(details.clone());
        self.bus.publish_error(details);

        if code == CLOSE_AUTH_REJECTED {
            // Fallback credentials rejected; silently retrying would loop
            // forever against the same answer.
            self.transition(&mut st, ConnectionState::Errored);
            return;
        }
        if !self.options.auto_reconnect {
            self.transition(&mut st, ConnectionState::Errored);
            return;
        }
        self.schedule_next_attempt(&mut st);
    }

    /// Drain the outbound buffer in priority-then-FIFO order while the
    /// transport stays open. A failed send consumes one unit of the
    /// message's retry budget; over budget, the message is dropped with one
    /// recorded Error event.
    async fn drain_buffer_locked(&self, st: &mut ClientState) {
        if st.buffer.is_empty() {
            return;
        }
        tracing::info!("Draining {} buffered message(s)", st.buffer.len());

        loop {
            let ClientState {
                transport, buffer, ..
            } = &mut *st;
            let Some(transport) = transport.as_mut() else {
                break;
            };
            if !transport.is_open() {
                break;
            }
            let Some(mut message) = buffer.pop_next() else {
                break;
            };

            match transport.send(&message.envelope, message.binary).await {
                Ok(()) => {}
                Err(e) => {
                    message.retry_count += 1;
                    if message.retry_count >= message.max_retries {
                        let details = format!(
                            "dropped message of type {} after {} failed attempt(s): {e}",
                            message.envelope.kind, message.retry_count
                        );
                        tracing::error!("{details}");
                        self.metrics.lock().unwrap().record_error(details.clone());
                        self.bus.publish_error(details);
                    } else {
                        tracing::warn!(
                            "Send failed (attempt {} of {}), requeueing: {e}",
                            message.retry_count,
                            message.max_retries
                        );
                        buffer.requeue(message);
                    }
                }
            }
        }
    }

    // ---- heartbeat hooks (called by HeartbeatMonitor) ----

    /// Send the next heartbeat ping and register it as outstanding. An older
    /// unanswered ping is abandoned here, never matched later.
    pub(crate) async fn heartbeat_ping(&self, epoch: u64) -> PingOutcome {
        let mut st = self.state.write().await;
        if st.transport_epoch != epoch
            || st.connection_state != ConnectionState::Connected
            || st.was_manual_disconnect
        {
            return PingOutcome::Stale;
        }

        st.ping_counter += 1;
        let id = st.ping_counter;
        let ping = Envelope::ping(id);

        let ClientState { transport, .. } = &mut *st;
        let Some(transport) = transport.as_mut() else {
            return PingOutcome::Stale;
        };
        match transport.send(&ping, false).await {
            Ok(()) => {
                st.pending_ping = Some(PendingPing {
                    id,
                    sent_at: Instant::now(),
                });
                tracing::debug!("Sent heartbeat ping {id}");
                PingOutcome::Sent(id)
            }
            Err(e) => {
                tracing::warn!("Failed to send heartbeat ping: {e}");
                PingOutcome::SendFailed
            }
        }
    }

    /// Called when the pong window for `ping_id` closes. Returns true when
    /// the monitor should stop: either the connection moved on, or the ping
    /// went unanswered and the transport was force-closed.
    pub(crate) async fn heartbeat_expired(&self, epoch: u64, ping_id: u64) -> bool {
        let mut st = self.state.write().await;
        if st.transport_epoch != epoch
            || st.connection_state != ConnectionState::Connected
            || st.was_manual_disconnect
        {
            return true;
        }

        match st.pending_ping {
            Some(pending) if pending.id == ping_id => {
                tracing::warn!("Heartbeat timeout, forcing transport closure");
                if let Some(mut transport) = st.transport.take() {
                    let _ = transport.close(CLOSE_HEARTBEAT_TIMEOUT).await;
                }
                st.transport_epoch += 1;
                st.pending_ping = None;

                let details = "heartbeat timeout: no pong within window".to_string();
                self.metrics.lock().unwrap().record_error(details.clone());
                self.bus.publish_error(details);

                if self.options.auto_reconnect {
                    self.schedule_next_attempt(&mut st);
                } else {
                    self.transition(&mut st, ConnectionState::Errored);
                }
                true
            }
            _ => false,
        }
    }
}
