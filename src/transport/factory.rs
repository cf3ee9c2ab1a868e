use std::time::Duration;

use super::{PollingTransport, Transport, TransportType, WebSocketTransport, ws_to_http_endpoint};
use crate::client::ChannelOptions;

/// Creates transport adapters for the state machine.
///
/// Production code uses [`NetTransportFactory`]; tests inject scripted
/// transports through this seam.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        kind: TransportType,
        options: &ChannelOptions,
        client_id: &str,
    ) -> Box<dyn Transport>;
}

/// Default factory building real network transports from the channel options.
pub struct NetTransportFactory;

impl TransportFactory for NetTransportFactory {
    fn create(
        &self,
        kind: TransportType,
        options: &ChannelOptions,
        client_id: &str,
    ) -> Box<dyn Transport> {
        match kind {
            TransportType::Socket => Box::new(WebSocketTransport::new(&options.url)),
            TransportType::Polling => Box::new(PollingTransport::new(
                ws_to_http_endpoint(&options.url),
                client_id,
                Duration::from_millis(options.fallback_polling_interval),
            )),
        }
    }
}
