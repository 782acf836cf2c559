// ── Runtime console configuration ──
//
// These types describe how the console paces, retries, and probes.
// They never touch disk: the CLI (via maintlink-config) constructs a
// `ConsoleConfig` and hands it in.

use std::time::Duration;

use crate::model::Channel;

/// Pacing and retry budget for one channel's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Pause after a successful command before the next one runs.
    pub command_delay: Duration,
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Pause after a failed attempt before it is retried.
    pub retry_delay: Duration,
    /// Bound on a single hardware call.
    pub command_timeout: Duration,
}

impl ChannelConfig {
    /// Factory defaults, tuned per board against real hardware latency.
    pub fn for_channel(channel: Channel) -> Self {
        let command_delay = match channel {
            Channel::Sensor => Duration::from_millis(800),
            Channel::Motor => Duration::from_millis(600),
            Channel::System => Duration::from_millis(400),
        };
        Self {
            command_delay,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-channel settings, one slot per [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub sensor: ChannelConfig,
    pub motor: ChannelConfig,
    pub system: ChannelConfig,
}

impl ChannelSettings {
    pub fn get(&self, channel: Channel) -> &ChannelConfig {
        match channel {
            Channel::Sensor => &self.sensor,
            Channel::Motor => &self.motor,
            Channel::System => &self.system,
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut ChannelConfig {
        match channel {
            Channel::Sensor => &mut self.sensor,
            Channel::Motor => &mut self.motor,
            Channel::System => &mut self.system,
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            sensor: ChannelConfig::for_channel(Channel::Sensor),
            motor: ChannelConfig::for_channel(Channel::Motor),
            system: ChannelConfig::for_channel(Channel::System),
        }
    }
}

/// Health monitor cadence and scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Register the periodic probe cycle with the poller set.
    pub enabled: bool,
    pub interval: Duration,
    /// Bound on a single liveness request.
    pub probe_timeout: Duration,
    /// Channels probed each cycle, in order. Only boards exposing a ping
    /// endpoint belong here.
    pub channels: Vec<Channel>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(3),
            channels: vec![Channel::Sensor, Channel::Motor],
        }
    }
}

/// Event stream client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub enabled: bool,
    /// Fixed wait before reopening a dropped feed.
    pub reconnect_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Everything the console needs at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub channels: ChannelSettings,
    pub health: HealthConfig,
    pub stream: StreamConfig,
    /// How often the mode supervisor polls the mode source. `None` leaves
    /// mode changes to feed pushes and explicit calls.
    pub mode_poll_interval: Option<Duration>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            channels: ChannelSettings::default(),
            health: HealthConfig::default(),
            stream: StreamConfig::default(),
            mode_poll_interval: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_delays_stay_asymmetric() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.get(Channel::Sensor).command_delay, Duration::from_millis(800));
        assert_eq!(settings.get(Channel::Motor).command_delay, Duration::from_millis(600));
        assert_eq!(settings.get(Channel::System).command_delay, Duration::from_millis(400));
        for channel in Channel::ALL {
            assert_eq!(settings.get(channel).max_retries, 3);
            assert_eq!(settings.get(channel).retry_delay, Duration::from_secs(1));
        }
    }

    #[test]
    fn health_defaults_probe_boards_with_ping() {
        let health = HealthConfig::default();
        assert!(health.enabled);
        assert_eq!(health.interval, Duration::from_secs(10));
        assert_eq!(health.probe_timeout, Duration::from_secs(3));
        assert_eq!(health.channels, vec![Channel::Sensor, Channel::Motor]);
    }
}
