// maintlink-core: Command dispatch and liveness layer between maintlink-api and the CLI.

pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod exclusive;
pub mod hardware;
pub mod health;
pub mod hub;
pub mod model;
pub mod permit;
pub mod poller;
pub mod queue;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{CommandHandle, Operation};
pub use config::{ChannelConfig, ChannelSettings, ConsoleConfig, HealthConfig, StreamConfig};
pub use console::{Console, ConsoleBuilder, ConsoleStatus, HEALTH_PROBE_PRODUCER};
pub use error::CoreError;
pub use exclusive::{ExclusiveGuard, ExclusiveStatus};
pub use hardware::{CommandReply, CommandSink, EventConnection, EventSource, ModeSource, ProbeReply};
pub use health::{HealthBoard, HealthMonitor, ProbeCycle, SkipReason};
pub use hub::{EventFilter, EventHub, SubscriptionId};
pub use permit::ChannelPermits;
pub use poller::PollerSet;
pub use queue::{CommandQueues, QueueStatus};
pub use stream::{EventStreamClient, decode_frame};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Channel, CommandId, ConsoleEvent, EventCategory, Health, Mode, Priority, Resource,
    SettleOutcome, Settlement, StreamEvent, StreamEventKind, StreamState,
};
