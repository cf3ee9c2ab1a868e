// Messaging module - outbound buffering, event fan-out, and inbound routing
pub mod buffer;
pub mod event_bus;
pub mod router;

pub use buffer::{BufferedMessage, MessageBuffer, Priority};
pub use event_bus::{ChannelNotice, EventBus, EventTag, Subscription};
pub use router::MessageRouter;
