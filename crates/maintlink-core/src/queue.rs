// ── Per-channel command queues ──
//
// Each channel owns a FIFO of command descriptors and at most one worker
// task draining it. The worker is spawned lazily by `submit` and exits when
// the queue runs dry or maintenance mode goes inactive; pending entries are
// never discarded on exit, they wait for the next `submit` or `resume_all`.
// Each attempt holds the channel's in-flight permit, which it shares with
// repeating exclusive timers and health probes on the same board.
//
// Ordering within a channel: FIFO, except that a failed command is put back
// at the head so its retry runs before anything queued behind it, and a
// high-priority submit lands right after any such retry.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{CommandDescriptor, CommandHandle, Operation};
use crate::config::{ChannelConfig, ChannelSettings};
use crate::error::CoreError;
use crate::health::HealthBoard;
use crate::hub::EventHub;
use crate::model::{Channel, CommandId, ConsoleEvent, Health, Mode, Priority, SettleOutcome, Settlement};
use crate::permit::ChannelPermits;

// ── Status snapshot ──────────────────────────────────────────────────

/// Point-in-time view of one channel queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub channel: Channel,
    pub pending: usize,
    pub processing: bool,
    pub in_flight: Option<CommandId>,
    #[serde(with = "millis")]
    pub command_delay: Duration,
    pub max_retries: u32,
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

// ── ChannelQueue ─────────────────────────────────────────────────────

#[derive(Default)]
struct QueueState {
    pending: VecDeque<CommandDescriptor>,
    processing: bool,
    in_flight: Option<CommandId>,
}

struct ChannelQueue {
    channel: Channel,
    config: ChannelConfig,
    state: Mutex<QueueState>,
}

impl ChannelQueue {
    fn new(channel: Channel, config: ChannelConfig) -> Self {
        Self {
            channel,
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn status(&self) -> QueueStatus {
        let state = self.state.lock();
        QueueStatus {
            channel: self.channel,
            pending: state.pending.len(),
            processing: state.processing,
            in_flight: state.in_flight,
            command_delay: self.config.command_delay,
            max_retries: self.config.max_retries,
        }
    }
}

// ── CommandQueues ────────────────────────────────────────────────────

/// The set of channel queues. Cheaply cloneable.
#[derive(Clone)]
pub struct CommandQueues {
    inner: Arc<QueuesInner>,
}

struct QueuesInner {
    sensor: ChannelQueue,
    motor: ChannelQueue,
    system: ChannelQueue,
    hub: Arc<EventHub>,
    health: Arc<HealthBoard>,
    permits: Arc<ChannelPermits>,
    mode: watch::Receiver<Mode>,
    /// Signalled whenever a worker stops or a queue changes shape.
    changed: Notify,
    cancel: CancellationToken,
}

impl CommandQueues {
    pub(crate) fn new(
        settings: &ChannelSettings,
        hub: Arc<EventHub>,
        health: Arc<HealthBoard>,
        permits: Arc<ChannelPermits>,
        mode: watch::Receiver<Mode>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(QueuesInner {
                sensor: ChannelQueue::new(Channel::Sensor, settings.sensor.clone()),
                motor: ChannelQueue::new(Channel::Motor, settings.motor.clone()),
                system: ChannelQueue::new(Channel::System, settings.system.clone()),
                hub,
                health,
                permits,
                mode,
                changed: Notify::new(),
                cancel,
            }),
        }
    }

    fn queue(&self, channel: Channel) -> &ChannelQueue {
        match channel {
            Channel::Sensor => &self.inner.sensor,
            Channel::Motor => &self.inner.motor,
            Channel::System => &self.inner.system,
        }
    }

    fn mode_active(&self) -> bool {
        self.inner.mode.borrow().is_active()
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Enqueue `operation` on `channel` and return immediately.
    ///
    /// Starts the channel worker if it is idle and mode is active. Must be
    /// called from within a Tokio runtime.
    pub fn submit(&self, channel: Channel, operation: Operation, priority: Priority) -> CommandHandle {
        let (descriptor, handle) = CommandDescriptor::new(channel, operation, priority);
        let id = descriptor.id;
        let label = descriptor.label().to_owned();
        let queue = self.queue(channel);

        let (start_worker, depth) = {
            let mut state = queue.state.lock();
            match priority {
                Priority::High => {
                    // Behind a pending retry, ahead of everything fresh
                    let at = state
                        .pending
                        .iter()
                        .position(|d| d.retries == 0)
                        .unwrap_or(state.pending.len());
                    state.pending.insert(at, descriptor);
                }
                Priority::Normal => state.pending.push_back(descriptor),
            }
            let start = !state.processing && self.mode_active() && !self.inner.cancel.is_cancelled();
            if start {
                state.processing = true;
            }
            (start, state.pending.len())
        };

        debug!(%channel, command_id = %id, command = %label, %priority, depth, "command queued");

        if start_worker {
            self.spawn_worker(channel);
        }
        handle
    }

    /// Restart workers for every channel holding pending entries.
    ///
    /// Called when mode turns active again.
    pub fn resume_all(&self) {
        if !self.mode_active() {
            return;
        }
        for channel in Channel::ALL {
            let queue = self.queue(channel);
            let start = {
                let mut state = queue.state.lock();
                let start = !state.processing && !state.pending.is_empty();
                if start {
                    state.processing = true;
                }
                start
            };
            if start {
                info!(%channel, "resuming queue");
                self.spawn_worker(channel);
            }
        }
    }

    fn spawn_worker(&self, channel: Channel) {
        let queues = self.clone();
        tokio::spawn(async move {
            queues.drain(channel).await;
        });
    }

    // ── Worker ───────────────────────────────────────────────────────

    async fn drain(&self, channel: Channel) {
        let queue = self.queue(channel);
        let config = &queue.config;
        debug!(%channel, "queue worker started");

        loop {
            let descriptor = {
                let mut state = queue.state.lock();
                if !self.mode_active() || self.inner.cancel.is_cancelled() {
                    state.processing = false;
                    if !state.pending.is_empty() {
                        info!(%channel, pending = state.pending.len(), "mode inactive, queue paused");
                    }
                    break;
                }
                let Some(descriptor) = state.pending.pop_front() else {
                    state.processing = false;
                    break;
                };
                state.in_flight = Some(descriptor.id);
                descriptor
            };

            let attempt = descriptor.retries + 1;
            debug!(
                %channel,
                command_id = %descriptor.id,
                command = descriptor.label(),
                attempt,
                "executing command"
            );

            let outcome = {
                let _permit = self.inner.permits.acquire(channel).await;
                match tokio::time::timeout(config.command_timeout, descriptor.operation.run()).await {
                    Ok(Ok(reply)) if reply.ok => Ok(reply.message),
                    Ok(Ok(reply)) => Err(reply
                        .message
                        .unwrap_or_else(|| "board reported failure".into())),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(CoreError::timed_out(config.command_timeout).to_string()),
                }
            };

            queue.state.lock().in_flight = None;

            match outcome {
                Ok(message) => {
                    self.record_health(channel, Health::Healthy);
                    self.settle(descriptor, SettleOutcome::Ok { message }, attempt);
                    self.pause(config.command_delay).await;
                }
                Err(reason) if descriptor.can_retry(config.max_retries) => {
                    let mut descriptor = descriptor;
                    descriptor.retries += 1;
                    warn!(
                        %channel,
                        command_id = %descriptor.id,
                        command = descriptor.label(),
                        retry = descriptor.retries,
                        max_retries = config.max_retries,
                        delay_ms = u64::try_from(config.retry_delay.as_millis()).unwrap_or(u64::MAX),
                        %reason,
                        "command failed, retrying"
                    );
                    queue.state.lock().pending.push_front(descriptor);
                    self.pause(config.retry_delay).await;
                }
                Err(reason) => {
                    error!(
                        %channel,
                        command_id = %descriptor.id,
                        command = descriptor.label(),
                        attempts = attempt,
                        %reason,
                        "command failed after retries"
                    );
                    self.record_health(channel, Health::Unhealthy);
                    self.settle(descriptor, SettleOutcome::Failed { reason }, attempt);
                }
            }
        }

        debug!(%channel, "queue worker stopped");
        self.inner.changed.notify_waiters();
    }

    async fn pause(&self, delay: Duration) {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    /// Command outcomes only count toward health while mode is active;
    /// an inactive console reports every channel as unknown.
    fn record_health(&self, channel: Channel, health: Health) {
        if self.mode_active() {
            self.inner.health.record(channel, health);
        } else {
            debug!(%channel, %health, "mode inactive, discarding health update");
        }
    }

    fn settle(&self, mut descriptor: CommandDescriptor, outcome: SettleOutcome, attempts: u32) {
        let settlement = Settlement {
            id: descriptor.id,
            channel: descriptor.channel,
            label: descriptor.label().to_owned(),
            outcome,
            attempts,
            enqueued_at: descriptor.enqueued_at,
            settled_at: Utc::now(),
        };
        if let Some(tx) = descriptor.settle_tx.take() {
            // Submitter may have dropped the handle
            let _ = tx.send(settlement.clone());
        }
        self.inner.hub.publish(ConsoleEvent::Settled(settlement));
    }

    // ── Operator actions ─────────────────────────────────────────────

    /// Drop every not-yet-started entry on `channel`, settling each as
    /// cancelled. The in-flight command (if any) is unaffected.
    pub fn cancel_pending(&self, channel: Channel) -> usize {
        let removed: Vec<CommandDescriptor> = self.queue(channel).state.lock().pending.drain(..).collect();
        let count = removed.len();
        for descriptor in removed {
            let attempts = descriptor.retries;
            self.settle(descriptor, SettleOutcome::Cancelled, attempts);
        }
        if count > 0 {
            info!(%channel, count, "pending commands cancelled");
            self.inner.changed.notify_waiters();
        }
        count
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn status(&self, channel: Channel) -> QueueStatus {
        self.queue(channel).status()
    }

    pub fn statuses(&self) -> Vec<QueueStatus> {
        Channel::ALL.iter().map(|c| self.status(*c)).collect()
    }

    /// First channel with queued-but-not-started entries.
    pub fn first_pending(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| !self.queue(*c).state.lock().pending.is_empty())
    }

    /// First channel whose worker is running.
    pub fn first_processing(&self) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|c| self.queue(*c).state.lock().processing)
    }

    pub fn is_idle(&self) -> bool {
        self.first_pending().is_none() && self.first_processing().is_none()
    }

    /// Resolve once every queue is empty and no worker runs.
    pub async fn wait_idle(&self) {
        self.wait_until(Self::is_idle).await;
    }

    /// Resolve once no worker runs; pending entries may remain.
    pub async fn wait_workers_stopped(&self) {
        self.wait_until(|q| q.first_processing().is_none()).await;
    }

    async fn wait_until(&self, done: impl Fn(&Self) -> bool) {
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if done(self) {
                return;
            }
            notified.await;
        }
    }
}
