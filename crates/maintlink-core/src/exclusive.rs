// ── Exclusive operation guard ──
//
// One flag per physical resource. While a flag is set, the health monitor
// skips its cycles and nobody else may start a competing operation on the
// same resource. A flag can own a repeating timer (continuous measurement)
// that is cancelled whenever the flag is cleared. Each timer run holds the
// owning channel's in-flight permit, so it takes turns with that channel's
// queue instead of overlapping it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Operation;
use crate::error::CoreError;
use crate::model::{Channel, Resource};
use crate::permit::ChannelPermits;

/// Snapshot of a held resource.
#[derive(Debug, Clone, Serialize)]
pub struct ExclusiveStatus {
    pub resource: Resource,
    pub owner: Channel,
    pub started_at: DateTime<Utc>,
    pub repeating: bool,
}

struct Held {
    started_at: DateTime<Utc>,
    timer: Option<CancellationToken>,
}

pub struct ExclusiveGuard {
    held: Mutex<BTreeMap<Resource, Held>>,
    permits: Arc<ChannelPermits>,
}

impl ExclusiveGuard {
    pub fn new(permits: Arc<ChannelPermits>) -> Self {
        Self {
            held: Mutex::new(BTreeMap::new()),
            permits,
        }
    }

    /// Set the flag for `resource`.
    pub fn begin(&self, resource: Resource) -> Result<(), CoreError> {
        self.acquire(resource, None)
    }

    /// Set the flag and run `operation` every `every` until it is cleared.
    ///
    /// The first run happens one interval in. Runs never overlap, and a
    /// slow run skips the ticks it missed. A run that exceeds `run_timeout`
    /// is abandoned. Failures are logged and the timer keeps going. Must
    /// be called from within a Tokio runtime.
    pub fn begin_repeating(
        &self,
        resource: Resource,
        every: Duration,
        run_timeout: Duration,
        operation: Operation,
    ) -> Result<(), CoreError> {
        if every.is_zero() {
            return Err(CoreError::Rejected {
                message: format!("{resource} needs a non-zero repeat interval"),
            });
        }
        let timer = CancellationToken::new();
        self.acquire(resource, Some(timer.clone()))?;
        tokio::spawn(repeat_task(RepeatTask {
            resource,
            every,
            run_timeout,
            operation,
            permits: Arc::clone(&self.permits),
            cancel: timer,
        }));
        Ok(())
    }

    fn acquire(&self, resource: Resource, timer: Option<CancellationToken>) -> Result<(), CoreError> {
        let mut held = self.held.lock();
        if held.contains_key(&resource) {
            return Err(CoreError::ExclusiveBusy { resource });
        }
        info!(%resource, owner = %resource.owner(), repeating = timer.is_some(), "exclusive operation started");
        held.insert(
            resource,
            Held {
                started_at: Utc::now(),
                timer,
            },
        );
        Ok(())
    }

    /// Clear the flag. Idempotent; returns `true` if it was set.
    pub fn end(&self, resource: Resource) -> bool {
        let Some(held) = self.held.lock().remove(&resource) else {
            return false;
        };
        if let Some(timer) = held.timer {
            timer.cancel();
        }
        info!(%resource, "exclusive operation ended");
        true
    }

    /// Clear every flag and cancel every repeating timer.
    pub fn end_all(&self) -> usize {
        let drained: Vec<(Resource, Held)> = std::mem::take(&mut *self.held.lock()).into_iter().collect();
        for (resource, held) in &drained {
            if let Some(timer) = &held.timer {
                timer.cancel();
            }
            info!(%resource, "exclusive operation cleared");
        }
        drained.len()
    }

    pub fn is_active(&self, resource: Resource) -> bool {
        self.held.lock().contains_key(&resource)
    }

    pub fn any_active(&self) -> bool {
        !self.held.lock().is_empty()
    }

    pub fn first_active(&self) -> Option<Resource> {
        self.held.lock().keys().next().copied()
    }

    pub fn active(&self) -> Vec<ExclusiveStatus> {
        self.held
            .lock()
            .iter()
            .map(|(resource, held)| ExclusiveStatus {
                resource: *resource,
                owner: resource.owner(),
                started_at: held.started_at,
                repeating: held.timer.is_some(),
            })
            .collect()
    }
}

struct RepeatTask {
    resource: Resource,
    every: Duration,
    run_timeout: Duration,
    operation: Operation,
    permits: Arc<ChannelPermits>,
    cancel: CancellationToken,
}

async fn repeat_task(task: RepeatTask) {
    let RepeatTask {
        resource,
        every,
        run_timeout,
        operation,
        permits,
        cancel,
    } = task;
    let owner = resource.owner();
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // Cancellation wins over waiting for the board or a run in progress
                let run = async {
                    let _permit = permits.acquire(owner).await;
                    tokio::time::timeout(run_timeout, operation.run()).await
                };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = run => match result {
                        Ok(Ok(reply)) if reply.ok => {
                            debug!(%resource, command = operation.label(), "repeating command sent");
                        }
                        Ok(Ok(reply)) => {
                            warn!(%resource, command = operation.label(), message = ?reply.message, "repeating command rejected");
                        }
                        Ok(Err(e)) => {
                            warn!(%resource, command = operation.label(), error = %e, "repeating command failed");
                        }
                        Err(_) => {
                            warn!(
                                %resource,
                                command = operation.label(),
                                timeout_ms = u64::try_from(run_timeout.as_millis()).unwrap_or(u64::MAX),
                                "repeating command timed out"
                            );
                        }
                    },
                }
            }
        }
    }

    debug!(%resource, "repeating timer stopped");
}
