// ── Console domain model ──
//
// Plain data shared by the queues, the health monitor, the stream client,
// and consumers of the event surface.

pub mod channel;
pub mod event;
pub mod mode;
pub mod settlement;
pub mod stream;

// ── Re-exports ──────────────────────────────────────────────────────

pub use channel::{Channel, Health, Priority};
pub use event::{ConsoleEvent, EventCategory};
pub use mode::{Mode, Resource};
pub use settlement::{CommandId, SettleOutcome, Settlement};
pub use stream::{StreamEvent, StreamEventKind, StreamState};
