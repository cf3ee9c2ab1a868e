use std::collections::VecDeque;
use std::time::Instant;

use crate::types::Envelope;

/// Delivery priority of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// An outbound message waiting for a usable transport.
///
/// Created when `send()` is called with no open transport or when a send
/// fails; removed on successful delivery or once `retry_count` reaches
/// `max_retries` (dropped with one recorded Error event).
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    pub envelope: Envelope,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub retry_count: u32,
    pub max_retries: u32,
    pub binary: bool,
}

impl BufferedMessage {
    pub fn new(envelope: Envelope, priority: Priority, max_retries: u32, binary: bool) -> Self {
        Self {
            envelope,
            priority,
            enqueued_at: Instant::now(),
            retry_count: 0,
            max_retries,
            binary,
        }
    }
}

/// Priority-ordered outbound queue: three FIFO tiers, drained strictly by
/// tier then FIFO within a tier.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    high: VecDeque<BufferedMessage>,
    normal: VecDeque<BufferedMessage>,
    low: VecDeque<BufferedMessage>,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, message: BufferedMessage) {
        self.tier_mut(message.priority).push_back(message);
    }

    /// Take the next message in drain order. Messages enqueued mid-drain are
    /// naturally visible to later pops; a requeued message never jumps ahead
    /// of queued higher-priority traffic.
    pub fn pop_next(&mut self) -> Option<BufferedMessage> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    /// Put a failed message back at the end of its own tier.
    pub fn requeue(&mut self, message: BufferedMessage) {
        self.tier_mut(message.priority).push_back(message);
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tier_mut(&mut self, priority: Priority) -> &mut VecDeque<BufferedMessage> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: &str, priority: Priority) -> BufferedMessage {
        BufferedMessage::new(Envelope::new(kind), priority, 3, false)
    }

    #[test]
    fn test_drains_by_priority_then_fifo() {
        let mut buffer = MessageBuffer::new();
        buffer.enqueue(msg("a", Priority::Low));
        buffer.enqueue(msg("b", Priority::High));
        buffer.enqueue(msg("c", Priority::Normal));

        let order: Vec<String> = std::iter::from_fn(|| buffer.pop_next())
            .map(|m| m.envelope.kind)
            .collect();
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut buffer = MessageBuffer::new();
        buffer.enqueue(msg("first", Priority::Normal));
        buffer.enqueue(msg("second", Priority::Normal));

        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "first");
        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "second");
    }

    #[test]
    fn test_requeue_goes_behind_same_tier() {
        let mut buffer = MessageBuffer::new();
        buffer.enqueue(msg("a", Priority::Normal));
        buffer.enqueue(msg("b", Priority::Normal));

        let failed = buffer.pop_next().unwrap();
        buffer.requeue(failed);

        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "b");
        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "a");
    }

    #[test]
    fn test_requeue_never_jumps_higher_tier() {
        let mut buffer = MessageBuffer::new();
        buffer.enqueue(msg("low", Priority::Low));
        let failed = buffer.pop_next().unwrap();

        buffer.enqueue(msg("high", Priority::High));
        buffer.requeue(failed);

        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "high");
        assert_eq!(buffer.pop_next().unwrap().envelope.kind, "low");
    }

    #[test]
    fn test_len_and_is_empty() {
        let mut buffer = MessageBuffer::new();
        assert!(buffer.is_empty());
        buffer.enqueue(msg("a", Priority::High));
        buffer.enqueue(msg("b", Priority::Low));
        assert_eq!(buffer.len(), 2);
    }
}
