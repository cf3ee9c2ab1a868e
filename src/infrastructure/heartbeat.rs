use std::time::Duration;
use tokio::time::sleep;

use crate::client::{PingOutcome, ResilientChannel};

/// Periodic liveness probe for the socket transport.
///
/// While the channel is Connected, sends a timestamped ping every
/// `interval`; if no matching pong arrives within `ping_timeout` the monitor
/// force-closes the transport with a distinct close code and lets the normal
/// close handling drive reconnection. The monitor stops itself the moment the
/// channel leaves Connected or the transport is swapped out (epoch check on
/// every wake), and its task is also aborted outright by `disconnect()`.
pub struct HeartbeatMonitor {
    channel: ResilientChannel,
    epoch: u64,
    interval: Duration,
    ping_timeout: Duration,
}

impl HeartbeatMonitor {
    pub(crate) fn new(channel: ResilientChannel, epoch: u64) -> Self {
        let interval = Duration::from_millis(channel.options().heartbeat_interval);
        let ping_timeout = Duration::from_millis(channel.options().ping_timeout);
        Self {
            channel,
            epoch,
            interval,
            ping_timeout,
        }
    }

    /// Run the probe loop until the connection it was started for goes away.
    ///
    /// Pings fire every `interval` regardless of how the previous one fared:
    /// the pong wait is carved out of the interval, not added on top of it.
    pub(crate) async fn run(self) {
        let after_check = self.interval.saturating_sub(self.ping_timeout);
        sleep(self.interval).await;
        loop {
            match self.channel.heartbeat_ping(self.epoch).await {
                PingOutcome::Sent(ping_id) => {
                    sleep(self.ping_timeout).await;
                    if self.channel.heartbeat_expired(self.epoch, ping_id).await {
                        break;
                    }
                    sleep(after_check).await;
                }
                PingOutcome::Stale => break,
                // Send failed but the transport has not reported closure yet;
                // the reader task will pick the closure up.
                PingOutcome::SendFailed => sleep(self.interval).await,
            }
        }
        tracing::debug!("Heartbeat monitor finished");
    }
}
