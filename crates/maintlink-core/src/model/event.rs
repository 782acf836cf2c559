// ── Console event surface ──

use serde::{Deserialize, Serialize};

use super::channel::{Channel, Health};
use super::mode::Mode;
use super::settlement::Settlement;
use super::stream::{StreamEvent, StreamState};

/// Everything the console reports to its consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConsoleEvent {
    /// A command reached its terminal outcome.
    Settled(Settlement),
    /// A channel's health classification changed.
    HealthChanged { channel: Channel, health: Health },
    /// Maintenance mode switched.
    ModeChanged { mode: Mode },
    /// Decoded event from the hardware feed.
    Stream(StreamEvent),
    /// Feed connection went up or down.
    StreamStatus { state: StreamState },
}

/// Coarse grouping used by handler filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Settlement,
    Health,
    Mode,
    Stream,
    StreamStatus,
}

impl ConsoleEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Settled(_) => EventCategory::Settlement,
            Self::HealthChanged { .. } => EventCategory::Health,
            Self::ModeChanged { .. } => EventCategory::Mode,
            Self::Stream(_) => EventCategory::Stream,
            Self::StreamStatus { .. } => EventCategory::StreamStatus,
        }
    }
}
