// ── Event feed domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::mode::Mode;

/// Machine state the service reports while maintenance mode is on.
const MAINTENANCE_STATE: &str = "bakim";

/// Connection state of the event stream client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Closed set of decoded feed event kinds; used to filter handlers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamEventKind {
    MotorTelemetry,
    SystemStatus,
    SensorReading,
    AlarmState,
    RawSensorMessage,
}

/// A hardware-originated event pushed over the feed.
///
/// `timestamp` is the service's monotonic clock in seconds, not wall time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    MotorTelemetry {
        motor_type: String,
        data: serde_json::Value,
        timestamp: Option<f64>,
    },
    SystemStatus {
        data: serde_json::Value,
        timestamp: Option<f64>,
    },
    SensorReading {
        data: serde_json::Value,
        timestamp: Option<f64>,
    },
    AlarmState {
        data: serde_json::Value,
        timestamp: Option<f64>,
    },
    /// Plain-text frame (greeting, echo, firmware chatter).
    RawSensorMessage { text: String },
}

impl StreamEvent {
    pub fn kind(&self) -> StreamEventKind {
        match self {
            Self::MotorTelemetry { .. } => StreamEventKind::MotorTelemetry,
            Self::SystemStatus { .. } => StreamEventKind::SystemStatus,
            Self::SensorReading { .. } => StreamEventKind::SensorReading,
            Self::AlarmState { .. } => StreamEventKind::AlarmState,
            Self::RawSensorMessage { .. } => StreamEventKind::RawSensorMessage,
        }
    }

    /// Weight in grams carried by a sensor reading (`data.agirlik`).
    pub fn weight_grams(&self) -> Option<f64> {
        match self {
            Self::SensorReading { data, .. } => data.get("agirlik").and_then(serde_json::Value::as_f64),
            _ => None,
        }
    }

    /// Mode implied by a system status push, if it carries a state.
    pub fn reported_mode(&self) -> Option<Mode> {
        match self {
            Self::SystemStatus { data, .. } => data
                .get("durum")
                .and_then(serde_json::Value::as_str)
                .map(|state| Mode::from_active(state == MAINTENANCE_STATE)),
            _ => None,
        }
    }
}
