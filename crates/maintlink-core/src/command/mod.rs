// ── Command descriptors ──
//
// A command is an opaque async operation plus the bookkeeping a channel
// queue needs to run it: identity, priority, retry count, and the oneshot
// the submitter awaits for the settlement.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::hardware::{CommandReply, CommandSink};
use crate::model::{Channel, CommandId, Priority, Settlement};

type OperationFn = dyn Fn() -> BoxFuture<'static, Result<CommandReply, CoreError>> + Send + Sync;

// ── Operation ────────────────────────────────────────────────────────

/// A re-runnable async action against the hardware.
///
/// Invoked once per attempt, so retries call the closure again rather
/// than polling a spent future.
#[derive(Clone)]
pub struct Operation {
    label: String,
    run: Arc<OperationFn>,
}

impl Operation {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<CommandReply, CoreError>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            run: Arc::new(run),
        }
    }

    /// Send `command` (with optional JSON payload) to `channel` via `sink`.
    pub fn hardware(
        sink: Arc<dyn CommandSink>,
        channel: Channel,
        command: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        let command: String = command.into();
        let label = command.clone();
        let command = Arc::<str>::from(command);
        let payload = payload.map(Arc::new);
        Self::new(label, move || {
            let sink = Arc::clone(&sink);
            let command = Arc::clone(&command);
            let payload = payload.clone();
            Box::pin(async move { sink.invoke(channel, &command, payload.as_deref()).await })
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start one attempt.
    pub(crate) fn run(&self) -> BoxFuture<'static, Result<CommandReply, CoreError>> {
        (self.run)()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("label", &self.label).finish_non_exhaustive()
    }
}

// ── CommandDescriptor ────────────────────────────────────────────────

/// One queued unit of work with retry bookkeeping.
pub(crate) struct CommandDescriptor {
    pub id: CommandId,
    pub channel: Channel,
    pub operation: Operation,
    pub priority: Priority,
    /// Retries already consumed; never exceeds the channel budget.
    pub retries: u32,
    pub enqueued_at: DateTime<Utc>,
    pub settle_tx: Option<oneshot::Sender<Settlement>>,
}

impl CommandDescriptor {
    pub fn new(channel: Channel, operation: Operation, priority: Priority) -> (Self, CommandHandle) {
        let id = CommandId::new();
        let (settle_tx, settle_rx) = oneshot::channel();
        let descriptor = Self {
            id,
            channel,
            operation,
            priority,
            retries: 0,
            enqueued_at: Utc::now(),
            settle_tx: Some(settle_tx),
        };
        let handle = CommandHandle {
            id,
            channel,
            settle_rx,
        };
        (descriptor, handle)
    }

    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retries < max_retries
    }

    pub fn label(&self) -> &str {
        self.operation.label()
    }
}

// ── CommandHandle ────────────────────────────────────────────────────

/// Returned from `submit`; lets the caller await the settlement.
///
/// Dropping the handle does not cancel the command.
#[derive(Debug)]
pub struct CommandHandle {
    id: CommandId,
    channel: Channel,
    settle_rx: oneshot::Receiver<Settlement>,
}

impl CommandHandle {
    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Wait until the command settles.
    ///
    /// Errors only if the console was torn down with the command still
    /// queued.
    pub async fn settled(self) -> Result<Settlement, CoreError> {
        self.settle_rx.await.map_err(|_| {
            CoreError::Internal(format!("command {} dropped before settling", self.id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operation_reruns_closure_per_attempt() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::new("count", move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(CommandReply::ok("done"))
            })
        });

        op.run().await.unwrap();
        op.run().await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(op.label(), "count");
    }

    #[test]
    fn retry_budget_is_exclusive_upper_bound() {
        let op = Operation::new("noop", || Box::pin(async { Ok(CommandReply::ok("")) }));
        let (mut desc, _handle) = CommandDescriptor::new(Channel::Motor, op, Priority::Normal);
        assert!(desc.can_retry(3));
        desc.retries = 3;
        assert!(!desc.can_retry(3));
    }
}
