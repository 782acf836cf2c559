// ── Mode-gated periodic producers ──
//
// Every piece of periodic background work (status refresh, sensor polling,
// fill level, the health probe cycle) is a named producer with its own
// interval. The set starts them together when maintenance mode turns on and
// stops them together when it turns off. Starting a running producer stops
// the old timer first, so there is never more than one timer per name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoreError;

type ProducerFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct PeriodicProducer {
    interval: Duration,
    action: Arc<ProducerFn>,
    running: Option<Running>,
}

impl PeriodicProducer {
    fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(running) => {
                running.cancel.cancel();
                running.task.abort();
                true
            }
            None => false,
        }
    }
}

/// Named periodic producers with idempotent start/stop.
#[derive(Default)]
pub struct PollerSet {
    producers: Mutex<BTreeMap<String, PeriodicProducer>>,
}

impl PollerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a producer. A replaced producer that was running is
    /// stopped; the new one starts on the next `start_all` (or `start`).
    /// A zero interval is rejected and leaves any existing producer alone.
    pub fn register<F>(&self, name: impl Into<String>, interval: Duration, action: F) -> Result<(), CoreError>
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            return Err(CoreError::Rejected {
                message: format!("producer {name} needs a non-zero interval"),
            });
        }
        let producer = PeriodicProducer {
            interval,
            action: Arc::new(action),
            running: None,
        };
        if let Some(mut old) = self.producers.lock().insert(name.clone(), producer) {
            old.stop();
        }
        debug!(producer = %name, interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX), "producer registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        match self.producers.lock().remove(name) {
            Some(mut producer) => {
                producer.stop();
                true
            }
            None => false,
        }
    }

    /// Start (or restart) one producer. Returns `false` if unknown.
    pub fn start(&self, name: &str) -> bool {
        let mut producers = self.producers.lock();
        let Some(producer) = producers.get_mut(name) else {
            return false;
        };
        producer.stop();
        producer.running = Some(spawn_producer(name.to_owned(), producer.interval, Arc::clone(&producer.action)));
        true
    }

    pub fn stop(&self, name: &str) -> bool {
        self.producers
            .lock()
            .get_mut(name)
            .is_some_and(PeriodicProducer::stop)
    }

    /// Start every registered producer. Must be called from within a
    /// Tokio runtime.
    pub fn start_all(&self) {
        let mut producers = self.producers.lock();
        for (name, producer) in producers.iter_mut() {
            producer.stop();
            producer.running = Some(spawn_producer(name.clone(), producer.interval, Arc::clone(&producer.action)));
        }
        info!(count = producers.len(), "periodic producers started");
    }

    pub fn stop_all(&self) {
        let mut stopped = 0usize;
        for producer in self.producers.lock().values_mut() {
            if producer.stop() {
                stopped += 1;
            }
        }
        if stopped > 0 {
            info!(count = stopped, "periodic producers stopped");
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.producers
            .lock()
            .get(name)
            .is_some_and(|p| p.running.as_ref().is_some_and(|r| !r.task.is_finished()))
    }

    /// Names of producers with a live timer.
    pub fn running(&self) -> Vec<String> {
        self.producers
            .lock()
            .iter()
            .filter(|(_, p)| p.running.as_ref().is_some_and(|r| !r.task.is_finished()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn registered(&self) -> Vec<String> {
        self.producers.lock().keys().cloned().collect()
    }
}

impl Drop for PollerSet {
    fn drop(&mut self) {
        for producer in self.producers.get_mut().values_mut() {
            producer.stop();
        }
    }
}

fn spawn_producer(name: String, every: Duration, action: Arc<ProducerFn>) -> Running {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(producer_task(name, every, action, cancel.clone()));
    Running { cancel, task }
}

async fn producer_task(name: String, every: Duration, action: Arc<ProducerFn>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                debug!(producer = %name, "producer tick");
                action().await;
            }
        }
    }
}
