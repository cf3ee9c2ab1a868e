// Client module - channel construction and the connection state machine
mod builder;
mod core;
mod state;

pub use builder::{ChannelBuilder, ChannelOptions};
pub use self::core::{ResilientChannel, SendOptions, SendOutcome};
pub use state::{ClientState, ConnectionState, PendingPing};

pub(crate) use self::core::PingOutcome;
