// Frame decoding for the maintenance feed.
//
// JSON frames are tagged by `"type"`. Plain text (greetings, echoes) is
// surfaced as a raw message. Anything that looks like JSON but does not
// decode is dropped with a debug log; it never ends the connection.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::model::StreamEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireFrame {
    #[serde(rename = "modbus_update")]
    Motor {
        motor_type: String,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    #[serde(rename = "system_status")]
    System {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    #[serde(rename = "sensor_update")]
    Sensor {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    #[serde(rename = "alarm_update")]
    Alarm {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
}

impl From<WireFrame> for StreamEvent {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Motor {
                motor_type,
                data,
                timestamp,
            } => Self::MotorTelemetry {
                motor_type,
                data,
                timestamp,
            },
            WireFrame::System { data, timestamp } => Self::SystemStatus { data, timestamp },
            WireFrame::Sensor { data, timestamp } => Self::SensorReading { data, timestamp },
            WireFrame::Alarm { data, timestamp } => Self::AlarmState { data, timestamp },
        }
    }
}

const KNOWN_TYPES: [&str; 4] = ["modbus_update", "system_status", "sensor_update", "alarm_update"];

/// Decode one text frame. `None` means "log and drop".
pub fn decode_frame(text: &str) -> Option<StreamEvent> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Some(StreamEvent::RawSensorMessage {
            text: trimmed.to_owned(),
        });
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Dropping malformed feed frame");
            return None;
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        debug!("Dropping feed frame without a type");
        return None;
    };

    if !KNOWN_TYPES.contains(&kind) {
        debug!(kind, "Dropping feed frame of unknown type");
        return None;
    }

    let kind = kind.to_owned();
    match serde_json::from_value::<WireFrame>(value) {
        Ok(frame) => Some(frame.into()),
        Err(e) => {
            debug!(error = %e, kind = %kind, "Dropping feed frame with bad payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, StreamEventKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_motor_telemetry() {
        let frame = json!({
            "type": "modbus_update",
            "motor_type": "crusher",
            "data": { "frequency": 50.0, "current": 3.2 },
            "timestamp": 1234.5
        });
        let event = decode_frame(&frame.to_string()).unwrap();
        assert_eq!(
            event,
            StreamEvent::MotorTelemetry {
                motor_type: "crusher".into(),
                data: json!({ "frequency": 50.0, "current": 3.2 }),
                timestamp: Some(1234.5),
            }
        );
    }

    #[test]
    fn decodes_sensor_reading_weight() {
        let frame = r#"{"type":"sensor_update","data":{"agirlik":87.25}}"#;
        let event = decode_frame(frame).unwrap();
        assert_eq!(event.kind(), StreamEventKind::SensorReading);
        assert_eq!(event.weight_grams(), Some(87.25));
    }

    #[test]
    fn decodes_system_status_and_alarm() {
        let status = decode_frame(r#"{"type":"system_status","data":{"durum":"bakim"}}"#).unwrap();
        assert_eq!(status.reported_mode(), Some(Mode::Active));

        let alarm = decode_frame(r#"{"type":"alarm_update","data":{"kma":"aktif"}}"#).unwrap();
        assert_eq!(alarm.kind(), StreamEventKind::AlarmState);
    }

    #[test]
    fn plain_text_is_raw_message() {
        let event = decode_frame("WebSocket bağlantısı kuruldu!").unwrap();
        assert_eq!(
            event,
            StreamEvent::RawSensorMessage {
                text: "WebSocket bağlantısı kuruldu!".into()
            }
        );
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        assert!(decode_frame("{not json").is_none());
        assert!(decode_frame(r#"{"data":{}}"#).is_none());
        assert!(decode_frame(r#"{"type":"firmware_blob","data":{}}"#).is_none());
        assert!(decode_frame(r#"{"type":"modbus_update","data":{}}"#).is_none());
        assert!(decode_frame("[1,2,3]").is_none());
        assert!(decode_frame("   ").is_none());
    }
}
