//! Event stream client: one long-lived feed subscription with reconnect.
//!
//! The client owns the connection exclusively. `connect()` spawns a session
//! task that opens the feed, decodes each frame into a [`StreamEvent`] and
//! publishes it on the [`EventHub`]. When the connection drops while the
//! client is still wanted, exactly one reconnect is scheduled after a fixed
//! delay. `disconnect()` ends the session and suppresses that reconnect.
//!
//! State transitions (`Disconnected -> Connecting -> Connected`) are
//! published as [`ConsoleEvent::StreamStatus`] and mirrored in a watch
//! channel.

pub mod decode;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hardware::{EventConnection, EventSource};
use crate::hub::EventHub;
use crate::model::{ConsoleEvent, StreamEvent, StreamState};

pub use decode::decode_frame;

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct StreamInner {
    source: Arc<dyn EventSource>,
    hub: Arc<EventHub>,
    reconnect_delay: Duration,
    /// Should a connection currently exist. Cleared by `disconnect`.
    desired: AtomicBool,
    reconnects: AtomicU64,
    state_tx: watch::Sender<StreamState>,
    session: Mutex<Option<Session>>,
    parent: CancellationToken,
}

impl StreamInner {
    /// Move to `state` unless the session owning `token` has been ended.
    ///
    /// Checked under the session lock so a late transition from a dying
    /// session can never overwrite `disconnect`'s `Disconnected`.
    fn transition(&self, token: &CancellationToken, state: StreamState) {
        let changed = {
            let _session = self.session.lock();
            if token.is_cancelled() {
                return;
            }
            self.set_state(state)
        };
        if changed {
            self.hub.publish(ConsoleEvent::StreamStatus { state });
        }
    }

    fn set_state(&self, state: StreamState) -> bool {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }
}

/// Resilient push-feed subscriber. Cheaply cloneable.
#[derive(Clone)]
pub struct EventStreamClient {
    inner: Arc<StreamInner>,
}

impl EventStreamClient {
    /// `parent` bounds every session: cancelling it ends the client for good.
    pub fn new(
        source: Arc<dyn EventSource>,
        hub: Arc<EventHub>,
        reconnect_delay: Duration,
        parent: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(StreamState::Disconnected);
        Self {
            inner: Arc::new(StreamInner {
                source,
                hub,
                reconnect_delay,
                desired: AtomicBool::new(false),
                reconnects: AtomicU64::new(0),
                state_tx,
                session: Mutex::new(None),
                parent,
            }),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state_tx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<StreamState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnects scheduled since construction.
    pub fn reconnect_attempts(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Acquire)
    }

    pub fn is_desired(&self) -> bool {
        self.inner.desired.load(Ordering::Acquire)
    }

    /// Start a session. No-op (returns `false`) while one is live.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> bool {
        let mut session = self.inner.session.lock();
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("event feed already connecting or connected");
            return false;
        }
        if self.inner.parent.is_cancelled() {
            debug!("event feed client shut down, not connecting");
            return false;
        }

        self.inner.desired.store(true, Ordering::Release);
        let cancel = self.inner.parent.child_token();
        let task = tokio::spawn(run_session(Arc::clone(&self.inner), cancel.clone()));
        *session = Some(Session { cancel, task });
        true
    }

    /// End the session and go `Disconnected`. Idempotent.
    pub fn disconnect(&self) {
        // Session task finishes on its own once cancelled
        drop(self.end_session());
    }

    /// Disconnect and wait for the session task to finish.
    pub async fn shutdown(&self) {
        if let Some(task) = self.end_session() {
            let _ = task.await;
        }
    }

    fn end_session(&self) -> Option<JoinHandle<()>> {
        self.inner.desired.store(false, Ordering::Release);
        let (task, changed) = {
            let mut session = self.inner.session.lock();
            let task = session.take().map(|s| {
                s.cancel.cancel();
                s.task
            });
            (task, self.inner.set_state(StreamState::Disconnected))
        };
        if task.is_some() {
            info!("event feed disconnected");
        }
        if changed {
            self.inner.hub.publish(ConsoleEvent::StreamStatus {
                state: StreamState::Disconnected,
            });
        }
        task
    }
}

// ── Session task ─────────────────────────────────────────────────────

async fn run_session(inner: Arc<StreamInner>, cancel: CancellationToken) {
    loop {
        inner.transition(&cancel, StreamState::Connecting);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inner.source.open() => result,
        };

        match opened {
            Ok(mut conn) => {
                inner.transition(&cancel, StreamState::Connected);
                info!("event feed connected");

                let ended_by_us = read_frames(&inner, conn.as_mut(), &cancel).await;
                conn.close().await;
                if ended_by_us {
                    break;
                }
                inner.transition(&cancel, StreamState::Disconnected);
            }
            Err(e) => {
                warn!(error = %e, "event feed connect failed");
                inner.transition(&cancel, StreamState::Disconnected);
            }
        }

        if cancel.is_cancelled() || !inner.desired.load(Ordering::Acquire) {
            break;
        }

        let attempt = inner.reconnects.fetch_add(1, Ordering::AcqRel) + 1;
        warn!(
            attempt,
            delay_ms = u64::try_from(inner.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "event feed down, reconnecting"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }

    debug!("event feed session ended");
}

/// Pump frames until the peer closes, the transport fails, or the session
/// is cancelled. Returns `true` only in the last case.
async fn read_frames(inner: &StreamInner, conn: &mut dyn EventConnection, cancel: &CancellationToken) -> bool {
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return true,
            frame = conn.next_frame() => frame,
        };

        match frame {
            Some(Ok(text)) => {
                if let Some(event) = decode_frame(&text) {
                    publish_event(inner, event);
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "event feed error");
                return false;
            }
            None => {
                info!("event feed closed by peer");
                return false;
            }
        }
    }
}

fn publish_event(inner: &StreamInner, event: StreamEvent) {
    debug!(kind = %event.kind(), "feed event");
    inner.hub.publish(ConsoleEvent::Stream(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::model::StreamEventKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    /// Frames arrive through the channel; dropping the sender closes it.
    struct ScriptedConnection {
        frames: Option<mpsc::UnboundedReceiver<String>>,
    }

    #[async_trait]
    impl EventConnection for ScriptedConnection {
        async fn next_frame(&mut self) -> Option<Result<String, CoreError>> {
            match self.frames.as_mut() {
                Some(rx) => rx.recv().await.map(Ok),
                // Never closes on its own
                None => futures_util::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    #[derive(Default)]
    struct ScriptedSource {
        scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>,
        opens: AtomicUsize,
    }

    impl ScriptedSource {
        fn with_connection() -> (Arc<Self>, mpsc::UnboundedSender<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let source = Self::default();
            source.scripts.lock().push_back(rx);
            (Arc::new(source), tx)
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn open(&self) -> Result<Box<dyn EventConnection>, CoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let frames = self.scripts.lock().pop_front();
            Ok(Box::new(ScriptedConnection { frames }))
        }
    }

    fn client(source: Arc<ScriptedSource>, hub: Arc<EventHub>) -> EventStreamClient {
        EventStreamClient::new(source, hub, Duration::from_secs(5), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_decoded_and_published() {
        let (source, tx) = ScriptedSource::with_connection();
        let hub = Arc::new(EventHub::new());
        let mut rx = hub.subscribe();
        let client = client(Arc::clone(&source), Arc::clone(&hub));

        assert!(client.connect());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.state(), StreamState::Connected);

        tx.send(r#"{"type":"sensor_update","data":{"agirlik":42.0}}"#.into()).unwrap();
        tx.send(r#"{"type":"mystery"}"#.into()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ConsoleEvent::Stream(stream_event) = event {
                kinds.push(stream_event.kind());
            }
        }
        assert_eq!(kinds, vec![StreamEventKind::SensorReading]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_live_is_noop() {
        let (source, _tx) = ScriptedSource::with_connection();
        let client = client(Arc::clone(&source), Arc::new(EventHub::new()));

        assert!(client.connect());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!client.connect());
        assert_eq!(source.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_while_desired_schedules_one_reconnect() {
        let (source, tx) = ScriptedSource::with_connection();
        let client = client(Arc::clone(&source), Arc::new(EventHub::new()));
        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.state(), StreamState::Disconnected);
        assert_eq!(client.reconnect_attempts(), 1);
        assert_eq!(source.opens(), 1);

        // Not before the fixed delay
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(source.opens(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.opens(), 2);
        assert_eq!(client.state(), StreamState::Connected);
        assert_eq!(client.reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_suppresses_reconnect() {
        let (source, tx) = ScriptedSource::with_connection();
        let hub = Arc::new(EventHub::new());
        let mut rx = hub.subscribe();
        let client = client(Arc::clone(&source), hub);
        client.connect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.disconnect();
        client.disconnect();
        drop(tx);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(source.opens(), 1);
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.state(), StreamState::Disconnected);

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ConsoleEvent::StreamStatus { state } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![StreamState::Connecting, StreamState::Connected, StreamState::Disconnected]
        );
    }
}
