// ── Console ──
//
// The owned context object for one maintenance session. Holds the channel
// queues, the health board and monitor, the exclusive guard, the mode-gated
// producers, and the feed client, and wires them to a single event hub.
//
// Mode is the master switch. `on_mode_change` is the only place that
// starts or stops background work, and it is serialized so overlapping
// transitions cannot interleave their side effects.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{CommandHandle, Operation};
use crate::config::ConsoleConfig;
use crate::error::CoreError;
use crate::exclusive::{ExclusiveGuard, ExclusiveStatus};
use crate::hardware::{CommandSink, EventSource, ModeSource};
use crate::health::{HealthBoard, HealthMonitor, ProbeCycle};
use crate::hub::{EventFilter, EventHub, SubscriptionId};
use crate::model::{
    Channel, ConsoleEvent, EventCategory, Health, Mode, Priority, Resource, Settlement, StreamEvent,
    StreamEventKind, StreamState,
};
use crate::permit::ChannelPermits;
use crate::poller::PollerSet;
use crate::queue::{CommandQueues, QueueStatus};
use crate::stream::EventStreamClient;

/// Producer name the health monitor registers under.
pub const HEALTH_PROBE_PRODUCER: &str = "health-probe";

// ── Status snapshot ──────────────────────────────────────────────────

/// Point-in-time view of the whole console.
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleStatus {
    pub mode: Mode,
    pub queues: Vec<QueueStatus>,
    pub health: BTreeMap<Channel, Health>,
    pub probing: bool,
    pub stream: StreamState,
    pub exclusive: Vec<ExclusiveStatus>,
    pub producers: Vec<String>,
}

// ── Builder ──────────────────────────────────────────────────────────

pub struct ConsoleBuilder {
    config: ConsoleConfig,
    sink: Arc<dyn CommandSink>,
    event_source: Option<Arc<dyn EventSource>>,
    mode_source: Option<Arc<dyn ModeSource>>,
}

impl ConsoleBuilder {
    /// Feed to subscribe to while mode is active.
    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.event_source = Some(source);
        self
    }

    /// Polled by the mode supervisor started with [`Console::start`].
    pub fn mode_source(mut self, source: Arc<dyn ModeSource>) -> Self {
        self.mode_source = Some(source);
        self
    }

    pub fn build(self) -> Console {
        let Self {
            config,
            sink,
            event_source,
            mode_source,
        } = self;

        let hub = Arc::new(EventHub::new());
        let (mode_tx, mode_rx) = watch::channel(Mode::Inactive);
        let cancel = CancellationToken::new();
        let health = Arc::new(HealthBoard::new(Arc::clone(&hub)));
        let permits = Arc::new(ChannelPermits::new());
        let exclusive = Arc::new(ExclusiveGuard::new(Arc::clone(&permits)));

        let queues = CommandQueues::new(
            &config.channels,
            Arc::clone(&hub),
            Arc::clone(&health),
            Arc::clone(&permits),
            mode_rx.clone(),
            cancel.clone(),
        );

        let monitor = Arc::new(HealthMonitor::new(
            config.health.clone(),
            Arc::clone(&sink),
            queues.clone(),
            Arc::clone(&exclusive),
            Arc::clone(&health),
            permits,
            mode_rx,
        ));

        let pollers = PollerSet::new();
        if config.health.enabled {
            let monitor = Arc::clone(&monitor);
            let registered = pollers.register(HEALTH_PROBE_PRODUCER, config.health.interval, move || {
                let monitor = Arc::clone(&monitor);
                Box::pin(async move {
                    if let ProbeCycle::Completed(results) = monitor.probe_all().await {
                        debug!(probed = results.len(), "probe cycle finished");
                    }
                })
            });
            if let Err(e) = registered {
                warn!(error = %e, "periodic health probing disabled");
            }
        }

        let stream = match event_source {
            Some(source) if config.stream.enabled => Some(EventStreamClient::new(
                source,
                Arc::clone(&hub),
                config.stream.reconnect_delay,
                cancel.child_token(),
            )),
            _ => None,
        };

        Console {
            inner: Arc::new(ConsoleInner {
                config,
                sink,
                hub,
                mode_tx,
                queues,
                health,
                monitor,
                exclusive,
                pollers,
                stream,
                mode_source,
                cancel,
                transition: Mutex::new(()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }
}

// ── Console ──────────────────────────────────────────────────────────

/// Maintenance console context. Cheaply cloneable.
#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

struct ConsoleInner {
    config: ConsoleConfig,
    sink: Arc<dyn CommandSink>,
    hub: Arc<EventHub>,
    mode_tx: watch::Sender<Mode>,
    queues: CommandQueues,
    health: Arc<HealthBoard>,
    monitor: Arc<HealthMonitor>,
    exclusive: Arc<ExclusiveGuard>,
    pollers: PollerSet,
    stream: Option<EventStreamClient>,
    mode_source: Option<Arc<dyn ModeSource>>,
    cancel: CancellationToken,
    transition: Mutex<()>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Console {
    pub fn builder(config: ConsoleConfig, sink: Arc<dyn CommandSink>) -> ConsoleBuilder {
        ConsoleBuilder {
            config,
            sink,
            event_source: None,
            mode_source: None,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the mode supervisor. Idempotent.
    ///
    /// The supervisor polls the mode source (first poll immediately) and
    /// follows `SystemStatus` feed pushes that carry a mode.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() || self.inner.cancel.is_cancelled() {
            return;
        }

        let ticker = match (&self.inner.mode_source, self.inner.config.mode_poll_interval) {
            (Some(_), Some(every)) if !every.is_zero() => {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(interval)
            }
            _ => None,
        };
        // Subscribe before spawning so no push is missed
        let events = self.inner.hub.subscribe();
        handles.push(tokio::spawn(mode_supervisor_task(self.clone(), ticker, events)));
        debug!("mode supervisor started");
    }

    /// Force mode inactive, stop every background task, and join them.
    pub async fn shutdown(&self) {
        self.on_mode_change(Mode::Inactive).await;
        self.inner.cancel.cancel();

        if let Some(stream) = &self.inner.stream {
            stream.shutdown().await;
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("console shut down");
    }

    // ── Mode ─────────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        *self.inner.mode_tx.borrow()
    }

    pub fn mode_changes(&self) -> watch::Receiver<Mode> {
        self.inner.mode_tx.subscribe()
    }

    /// Current mode followed by every change, as a `Stream`.
    pub fn mode_stream(&self) -> WatchStream<Mode> {
        WatchStream::new(self.mode_changes())
    }

    /// Apply a mode transition. Returns `false` if `mode` is already current.
    ///
    /// Active: start every producer, open the feed, resume queues holding
    /// entries. Inactive: stop every producer, close the feed, clear every
    /// exclusive flag, reset health to unknown. Queued commands are kept.
    pub async fn on_mode_change(&self, mode: Mode) -> bool {
        let inner = &self.inner;
        {
            let _transition = inner.transition.lock().await;

            let changed = inner.mode_tx.send_if_modified(|current| {
                if *current == mode {
                    false
                } else {
                    *current = mode;
                    true
                }
            });
            if !changed {
                debug!(%mode, "mode unchanged");
                return false;
            }

            match mode {
                Mode::Active => {
                    info!("maintenance mode active");
                    inner.pollers.start_all();
                    if let Some(stream) = &inner.stream {
                        stream.connect();
                    }
                    inner.queues.resume_all();
                }
                Mode::Inactive => {
                    info!("maintenance mode inactive");
                    inner.pollers.stop_all();
                    if let Some(stream) = &inner.stream {
                        stream.disconnect();
                    }
                    let cleared = inner.exclusive.end_all();
                    if cleared > 0 {
                        debug!(cleared, "exclusive operations cleared");
                    }
                    inner.health.reset_all();
                }
            }
        }

        inner.hub.publish(ConsoleEvent::ModeChanged { mode });
        true
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Enqueue `operation` on `channel`; returns immediately.
    pub fn submit(&self, channel: Channel, operation: Operation, priority: Priority) -> CommandHandle {
        self.inner.queues.submit(channel, operation, priority)
    }

    /// Enqueue a named board command.
    pub fn submit_command(
        &self,
        channel: Channel,
        command: impl Into<String>,
        payload: Option<Value>,
        priority: Priority,
    ) -> CommandHandle {
        let operation = self.hardware_operation(channel, command, payload);
        self.submit(channel, operation, priority)
    }

    /// An [`Operation`] that sends `command` through this console's sink.
    pub fn hardware_operation(
        &self,
        channel: Channel,
        command: impl Into<String>,
        payload: Option<Value>,
    ) -> Operation {
        Operation::hardware(Arc::clone(&self.inner.sink), channel, command, payload)
    }

    /// Drop not-yet-started entries on `channel`, settling each as cancelled.
    pub fn cancel_pending(&self, channel: Channel) -> usize {
        self.inner.queues.cancel_pending(channel)
    }

    /// Resolve once every queue is empty and idle.
    pub async fn wait_idle(&self) {
        self.inner.queues.wait_idle().await;
    }

    // ── Exclusive operations ─────────────────────────────────────────

    /// Set or clear the flag on `resource`. Clearing is idempotent.
    pub fn set_exclusive_operation(&self, resource: Resource, active: bool) -> Result<(), CoreError> {
        if active {
            self.inner.exclusive.begin(resource)
        } else {
            self.inner.exclusive.end(resource);
            Ok(())
        }
    }

    /// Hold `resource` and run `operation` every `every` until the flag is
    /// cleared or mode goes inactive. Each run shares the owning channel
    /// with its queue and is bounded by that channel's command timeout.
    pub async fn begin_repeating_exclusive(
        &self,
        resource: Resource,
        every: Duration,
        operation: Operation,
    ) -> Result<(), CoreError> {
        let _transition = self.inner.transition.lock().await;
        if !self.mode().is_active() {
            return Err(CoreError::Rejected {
                message: format!("cannot start {resource} while maintenance mode is inactive"),
            });
        }
        let run_timeout = self.inner.config.channels.get(resource.owner()).command_timeout;
        self.inner
            .exclusive
            .begin_repeating(resource, every, run_timeout, operation)
    }

    pub fn exclusive_active(&self, resource: Resource) -> bool {
        self.inner.exclusive.is_active(resource)
    }

    // ── Health ───────────────────────────────────────────────────────

    /// Run one probe cycle now, subject to the usual preconditions.
    pub async fn probe_all(&self) -> ProbeCycle {
        self.inner.monitor.probe_all().await
    }

    pub fn health(&self, channel: Channel) -> Health {
        self.inner.health.get(channel)
    }

    pub fn health_snapshot(&self) -> BTreeMap<Channel, Health> {
        self.inner.health.snapshot()
    }

    // ── Periodic producers ───────────────────────────────────────────

    /// Register a mode-gated producer. Starts right away if mode is active.
    pub async fn register_producer<F>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        action: F,
    ) -> Result<(), CoreError>
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let name = name.into();
        // Mode cannot flip between the check and the start
        let _transition = self.inner.transition.lock().await;
        self.inner.pollers.register(name.clone(), interval, action)?;
        if self.mode().is_active() {
            self.inner.pollers.start(&name);
        }
        Ok(())
    }

    pub fn unregister_producer(&self, name: &str) -> bool {
        self.inner.pollers.unregister(name)
    }

    pub fn running_producers(&self) -> Vec<String> {
        self.inner.pollers.running()
    }

    // ── Stream ───────────────────────────────────────────────────────

    pub fn stream_state(&self) -> StreamState {
        self.inner
            .stream
            .as_ref()
            .map_or(StreamState::Disconnected, EventStreamClient::state)
    }

    pub fn stream(&self) -> Option<&EventStreamClient> {
        self.inner.stream.as_ref()
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Async receiver for every event published from now on.
    pub fn events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.inner.hub.subscribe()
    }

    /// [`events`](Self::events) as a `Stream`. Events missed by a slow
    /// consumer are skipped.
    pub fn event_stream(&self) -> impl Stream<Item = ConsoleEvent> + Send + 'static {
        BroadcastStream::new(self.events()).filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "event stream consumer lagged");
                None
            }
        })
    }

    pub fn on_event<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ConsoleEvent) + Send + Sync + 'static,
    {
        self.inner.hub.register(filter, handler)
    }

    pub fn on_settled<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Settlement) + Send + Sync + 'static,
    {
        self.on_event(EventFilter::Categories(vec![EventCategory::Settlement]), move |event| {
            if let ConsoleEvent::Settled(settlement) = event {
                handler(settlement);
            }
        })
    }

    pub fn on_health_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Channel, Health) + Send + Sync + 'static,
    {
        self.on_event(EventFilter::Categories(vec![EventCategory::Health]), move |event| {
            if let ConsoleEvent::HealthChanged { channel, health } = event {
                handler(*channel, *health);
            }
        })
    }

    pub fn on_mode_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(Mode) + Send + Sync + 'static,
    {
        self.on_event(EventFilter::Categories(vec![EventCategory::Mode]), move |event| {
            if let ConsoleEvent::ModeChanged { mode } = event {
                handler(*mode);
            }
        })
    }

    pub fn on_stream_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.on_event(EventFilter::Categories(vec![EventCategory::Stream]), move |event| {
            if let ConsoleEvent::Stream(stream_event) = event {
                handler(stream_event);
            }
        })
    }

    /// Feed events of the given kinds only.
    pub fn on_stream_kind<F>(&self, kinds: Vec<StreamEventKind>, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.on_event(EventFilter::StreamKinds(kinds), move |event| {
            if let ConsoleEvent::Stream(stream_event) = event {
                handler(stream_event);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.hub.unsubscribe(id)
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn status(&self) -> ConsoleStatus {
        ConsoleStatus {
            mode: self.mode(),
            queues: self.inner.queues.statuses(),
            health: self.health_snapshot(),
            probing: self.inner.monitor.is_probing(),
            stream: self.stream_state(),
            exclusive: self.inner.exclusive.active(),
            producers: self.running_producers(),
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Feed observed modes into `on_mode_change` until the console shuts down.
async fn mode_supervisor_task(
    console: Console,
    mut ticker: Option<Interval>,
    mut events: broadcast::Receiver<ConsoleEvent>,
) {
    let cancel = console.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = next_tick(&mut ticker) => {
                let Some(source) = &console.inner.mode_source else { continue };
                match source.current_mode().await {
                    Ok(mode) => {
                        console.on_mode_change(mode).await;
                    }
                    Err(e) => warn!(error = %e, "mode poll failed"),
                }
            }
            received = events.recv() => match received {
                Ok(ConsoleEvent::Stream(event)) => {
                    if let Some(mode) = event.reported_mode() {
                        console.on_mode_change(mode).await;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "mode supervisor lagged behind event hub");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    debug!("mode supervisor stopped");
}
