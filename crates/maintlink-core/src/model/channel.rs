// ── Channels and their liveness state ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use maintlink_api::Board;

/// One independently serialized command path to a physical subsystem.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Channel {
    Sensor,
    Motor,
    System,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Sensor, Channel::Motor, Channel::System];

    /// Board on the service this channel drives.
    pub fn board(self) -> Board {
        match self {
            Self::Sensor => Board::Sensor,
            Self::Motor => Board::Motor,
            Self::System => Board::System,
        }
    }
}

/// Last-known liveness classification of a channel.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Health {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

/// Queue placement for a submitted command.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    #[default]
    Normal,
    High,
}
