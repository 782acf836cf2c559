// ── Command identity and terminal outcomes ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::channel::Channel;

/// Unique id assigned to every submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettleOutcome {
    /// The board accepted the command.
    Ok { message: Option<String> },
    /// Every attempt failed; `reason` is the last failure.
    Failed { reason: String },
    /// Removed from the queue before it ever ran.
    Cancelled,
}

impl SettleOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Terminal record emitted exactly once per command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: CommandId,
    pub channel: Channel,
    pub label: String,
    #[serde(flatten)]
    pub outcome: SettleOutcome,
    /// Number of times the operation was executed (0 when cancelled).
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_are_unique() {
        assert_ne!(CommandId::new(), CommandId::new());
    }

    #[test]
    fn settlement_serializes_flat_outcome() {
        let now = Utc::now();
        let settlement = Settlement {
            id: CommandId::new(),
            channel: Channel::Motor,
            label: "konveyor-ileri".into(),
            outcome: SettleOutcome::Failed {
                reason: "timeout".into(),
            },
            attempts: 4,
            enqueued_at: now,
            settled_at: now,
        };
        let json = serde_json::to_value(&settlement).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "timeout");
        assert_eq!(json["channel"], "motor");
        assert!(!settlement.is_ok());
    }
}
