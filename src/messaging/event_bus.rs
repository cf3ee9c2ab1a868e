use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

use crate::client::ConnectionState;
use crate::types::Envelope;

/// Capacity of each subscriber's delivery queue. Publishing never blocks the
/// state machine; a subscriber that stops draining loses newest-first.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// What a subscriber can register interest in. A closed set: there is no
/// string-keyed callback registry to typo against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTag {
    /// Every connection state transition.
    StateChanged,
    /// Inbound messages of one specific envelope type.
    Message(String),
    /// Catch-all: every inbound message, including unparseable raw payloads.
    AnyMessage,
    /// Internally handled errors (send drops, transport failures).
    Error,
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ChannelNotice {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Message(Envelope),
    /// Payload that failed envelope parsing, forwarded rather than dropped.
    Raw(String),
    Error(String),
}

struct BusSubscriber {
    id: u64,
    tag: EventTag,
    tx: mpsc::Sender<ChannelNotice>,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<BusSubscriber>,
}

/// Fan-out dispatch of inbound messages and state changes.
///
/// Shared, read-mostly collaborator: the state machine publishes, any number
/// of consumers subscribe. Publishing is synchronous and non-blocking.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `tag`. The returned [`Subscription`] unregisters
    /// the listener when dropped (or via [`Subscription::unsubscribe`]), so
    /// consumer teardown cannot leak listeners.
    pub fn subscribe(&self, tag: EventTag) -> (Subscription, mpsc::Receiver<ChannelNotice>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(BusSubscriber { id, tag, tx });

        let subscription = Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        };
        (subscription, rx)
    }

    pub(crate) fn publish_state(&self, from: ConnectionState, to: ConnectionState) {
        self.publish(
            |tag| *tag == EventTag::StateChanged,
            ChannelNotice::StateChanged { from, to },
        );
    }

    pub(crate) fn publish_message(&self, envelope: Envelope) {
        let kind = envelope.kind.clone();
        self.publish(
            move |tag| match tag {
                EventTag::AnyMessage => true,
                EventTag::Message(wanted) => *wanted == kind,
                _ => false,
            },
            ChannelNotice::Message(envelope),
        );
    }

    pub(crate) fn publish_raw(&self, payload: String) {
        self.publish(
            |tag| *tag == EventTag::AnyMessage,
            ChannelNotice::Raw(payload),
        );
    }

    pub(crate) fn publish_error(&self, details: String) {
        self.publish(|tag| *tag == EventTag::Error, ChannelNotice::Error(details));
    }

    fn publish<F>(&self, matches: F, notice: ChannelNotice)
    where
        F: Fn(&EventTag) -> bool,
    {
        let senders: Vec<mpsc::Sender<ChannelNotice>> = {
            let inner = self.inner.lock().unwrap();
            inner
                .subscribers
                .iter()
                .filter(|s| matches(&s.tag))
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in senders {
            if tx.try_send(notice.clone()).is_err() {
                tracing::debug!("Dropping notice for slow or closed subscriber");
            }
        }
    }
}

/// Scoped unsubscribe token returned by [`EventBus::subscribe`].
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Explicitly release the subscription. Dropping has the same effect.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = inner.lock().unwrap();
            inner.subscribers.retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_message_tag_filters_by_type() {
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.subscribe(EventTag::Message("notification".to_string()));

        bus.publish_message(Envelope::new("other"));
        bus.publish_message(Envelope::new("notification"));

        let notice = rx.recv().await.unwrap();
        match notice {
            ChannelNotice::Message(envelope) => assert_eq!(envelope.kind, "notification"),
            other => panic!("unexpected notice: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_catch_all_receives_everything() {
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.subscribe(EventTag::AnyMessage);

        bus.publish_message(Envelope::new("a"));
        bus.publish_raw("not json".to_string());

        assert!(matches!(rx.recv().await, Some(ChannelNotice::Message(_))));
        assert!(matches!(rx.recv().await, Some(ChannelNotice::Raw(_))));
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let bus = EventBus::new();
        let (sub, mut rx) = bus.subscribe(EventTag::AnyMessage);

        bus.publish_message(Envelope::new("before"));
        drop(sub);
        bus.publish_message(Envelope::new("after"));

        assert!(matches!(rx.recv().await, Some(ChannelNotice::Message(m)) if m.kind == "before"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_state_changes_reach_state_subscribers_only() {
        let bus = EventBus::new();
        let (_state_sub, mut state_rx) = bus.subscribe(EventTag::StateChanged);
        let (_msg_sub, mut msg_rx) = bus.subscribe(EventTag::AnyMessage);

        bus.publish_state(ConnectionState::Disconnected, ConnectionState::Connecting);

        assert!(matches!(
            state_rx.recv().await,
            Some(ChannelNotice::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting,
            })
        ));
        assert!(msg_rx.try_recv().is_err());
    }
}
