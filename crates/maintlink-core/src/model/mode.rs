// ── Operating mode and exclusive resources ──

use serde::{Deserialize, Serialize};
use strum::Display;

use super::channel::Channel;

/// External operating state gating all periodic background work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    #[default]
    Inactive,
    Active,
}

impl Mode {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn from_active(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }
}

/// A physical resource that long-running operations can hold exclusively.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Resource {
    /// Continuous load-cell sampling.
    WeightMeasurement,
    /// Sensor teach / zero calibration.
    Calibration,
}

impl Resource {
    /// Channel that physically owns the resource.
    pub fn owner(self) -> Channel {
        match self {
            Self::WeightMeasurement | Self::Calibration => Channel::Sensor,
        }
    }
}
