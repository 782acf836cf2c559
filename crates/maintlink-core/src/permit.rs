// ── Per-channel in-flight permits ──
//
// A board handles one request at a time. Every caller that talks to a
// board (queue worker, repeating exclusive timer, health probe) holds the
// channel's permit for the duration of the call, so at most one request
// per channel is ever outstanding.

use tokio::sync::{Mutex, MutexGuard};

use crate::model::Channel;

/// Held while a request is outstanding on a channel.
pub type InFlight<'a> = MutexGuard<'a, ()>;

#[derive(Default)]
pub struct ChannelPermits {
    sensor: Mutex<()>,
    motor: Mutex<()>,
    system: Mutex<()>,
}

impl ChannelPermits {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, channel: Channel) -> &Mutex<()> {
        match channel {
            Channel::Sensor => &self.sensor,
            Channel::Motor => &self.motor,
            Channel::System => &self.system,
        }
    }

    /// Wait until nothing else is in flight on `channel`. Waiters are
    /// served in arrival order.
    pub async fn acquire(&self, channel: Channel) -> InFlight<'_> {
        self.lane(channel).lock().await
    }

    /// `true` while some caller holds the permit for `channel`.
    pub fn is_busy(&self, channel: Channel) -> bool {
        self.lane(channel).try_lock().is_err()
    }
}
