// ── Channel health: board of record + probe cycle ──
//
// `HealthBoard` holds the last-known health per channel and publishes a
// `HealthChanged` event only when a value actually changes.
//
// `HealthMonitor` runs one liveness probe per configured channel, but only
// when nothing else is touching the hardware: no exclusive operation, no
// queued commands, no running queue worker. A cycle that finds any of those
// is skipped whole and leaves health untouched. Each probe still takes the
// channel's in-flight permit in case a command arrives mid-cycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::HealthConfig;
use crate::exclusive::ExclusiveGuard;
use crate::hardware::CommandSink;
use crate::hub::EventHub;
use crate::model::{Channel, ConsoleEvent, Health, Mode, Resource};
use crate::permit::ChannelPermits;
use crate::queue::CommandQueues;

// ── HealthBoard ──────────────────────────────────────────────────────

/// Last-known health per channel.
pub struct HealthBoard {
    states: Mutex<HashMap<Channel, Health>>,
    hub: Arc<EventHub>,
}

impl HealthBoard {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            hub,
        }
    }

    pub fn get(&self, channel: Channel) -> Health {
        self.states.lock().get(&channel).copied().unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<Channel, Health> {
        Channel::ALL.into_iter().map(|c| (c, self.get(c))).collect()
    }

    /// Store `health`; returns `true` (and publishes) if it changed.
    pub fn record(&self, channel: Channel, health: Health) -> bool {
        let previous = self.states.lock().insert(channel, health).unwrap_or_default();
        if previous == health {
            return false;
        }
        debug!(%channel, from = %previous, to = %health, "channel health changed");
        self.hub.publish(ConsoleEvent::HealthChanged { channel, health });
        true
    }

    /// Revert every channel to `Unknown`.
    pub fn reset_all(&self) {
        for channel in Channel::ALL {
            self.record(channel, Health::Unknown);
        }
    }
}

// ── Probe cycle outcome ──────────────────────────────────────────────

/// Why a probe cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "subject", rename_all = "snake_case")]
pub enum SkipReason {
    ExclusiveActive(Resource),
    QueuePending(Channel),
    QueueProcessing(Channel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCycle {
    /// Probes ran; one entry per channel actually probed.
    Completed(BTreeMap<Channel, Health>),
    /// A precondition failed; nothing was probed.
    Skipped(SkipReason),
    /// Another cycle was still in progress.
    AlreadyRunning,
}

// ── HealthMonitor ────────────────────────────────────────────────────

pub struct HealthMonitor {
    config: HealthConfig,
    sink: Arc<dyn CommandSink>,
    queues: CommandQueues,
    exclusive: Arc<ExclusiveGuard>,
    board: Arc<HealthBoard>,
    permits: Arc<ChannelPermits>,
    mode: watch::Receiver<Mode>,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag however the cycle ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl HealthMonitor {
    pub(crate) fn new(
        config: HealthConfig,
        sink: Arc<dyn CommandSink>,
        queues: CommandQueues,
        exclusive: Arc<ExclusiveGuard>,
        board: Arc<HealthBoard>,
        permits: Arc<ChannelPermits>,
        mode: watch::Receiver<Mode>,
    ) -> Self {
        Self {
            config,
            sink,
            queues,
            exclusive,
            board,
            permits,
            mode,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_probing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    fn precondition_failure(&self) -> Option<SkipReason> {
        if let Some(resource) = self.exclusive.first_active() {
            return Some(SkipReason::ExclusiveActive(resource));
        }
        if let Some(channel) = self.queues.first_pending() {
            return Some(SkipReason::QueuePending(channel));
        }
        self.queues.first_processing().map(SkipReason::QueueProcessing)
    }

    /// Run one probe cycle.
    pub async fn probe_all(&self) -> ProbeCycle {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("probe cycle already running");
            return ProbeCycle::AlreadyRunning;
        }
        let _guard = CycleGuard(&self.in_progress);

        if let Some(reason) = self.precondition_failure() {
            debug!(?reason, "probe cycle skipped");
            return ProbeCycle::Skipped(reason);
        }

        let mut results = BTreeMap::new();
        for &channel in &self.config.channels {
            // An exclusive operation may start while earlier probes run
            if let Some(resource) = self.exclusive.first_active() {
                info!(%resource, "exclusive operation started mid-cycle, stopping probes");
                break;
            }

            let reply = {
                let _permit = self.permits.acquire(channel).await;
                tokio::time::timeout(self.config.probe_timeout, self.sink.probe(channel)).await
            };
            let health = match reply {
                Ok(Ok(reply)) if reply.healthy => Health::Healthy,
                Ok(Ok(reply)) => {
                    debug!(%channel, message = ?reply.message, "board reports unhealthy");
                    Health::Unhealthy
                }
                Ok(Err(e)) => {
                    debug!(%channel, error = %e, "probe failed");
                    Health::Unhealthy
                }
                Err(_) => {
                    debug!(
                        %channel,
                        timeout_ms = u64::try_from(self.config.probe_timeout.as_millis()).unwrap_or(u64::MAX),
                        "probe timed out"
                    );
                    Health::Unhealthy
                }
            };
            results.insert(channel, health);
        }

        if self.mode.borrow().is_active() {
            for (&channel, &health) in &results {
                self.board.record(channel, health);
            }
        } else {
            debug!("mode inactive, probe results not recorded");
        }

        ProbeCycle::Completed(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::EventFilter;
    use crate::model::EventCategory;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn board_publishes_only_on_change() {
        let hub = Arc::new(EventHub::new());
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        hub.register(EventFilter::Categories(vec![EventCategory::Health]), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let board = HealthBoard::new(hub);

        assert!(board.record(Channel::Motor, Health::Healthy));
        assert!(!board.record(Channel::Motor, Health::Healthy));
        assert!(board.record(Channel::Motor, Health::Unhealthy));
        assert_eq!(changes.load(Ordering::SeqCst), 2);
        assert_eq!(board.get(Channel::Motor), Health::Unhealthy);
        assert_eq!(board.get(Channel::Sensor), Health::Unknown);
    }

    #[test]
    fn reset_reverts_everything_to_unknown() {
        let board = HealthBoard::new(Arc::new(EventHub::new()));
        board.record(Channel::Sensor, Health::Healthy);
        board.record(Channel::System, Health::Unhealthy);

        board.reset_all();

        assert!(board.snapshot().values().all(|h| *h == Health::Unknown));
    }
}
