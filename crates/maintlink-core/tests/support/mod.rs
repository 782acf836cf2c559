// In-memory stand-ins for the board service, the mode source, and the feed.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use maintlink_core::{
    Channel, CommandReply, CommandSink, CoreError, EventConnection, EventSource, Mode, ModeSource,
    ProbeReply,
};

// ── Command sink ─────────────────────────────────────────────────────

/// Records every call and enforces nothing; tests assert on the log.
pub struct MockSink {
    latency: Duration,
    calls: Mutex<Vec<(Channel, String)>>,
    probes: Mutex<Vec<Channel>>,
    in_flight: Mutex<HashMap<Channel, usize>>,
    max_in_flight: Mutex<HashMap<Channel, usize>>,
    /// Command name -> failures still to report before succeeding.
    failures: Mutex<HashMap<String, u32>>,
    unhealthy: Mutex<Vec<Channel>>,
}

impl MockSink {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            calls: Mutex::new(Vec::new()),
            probes: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            unhealthy: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_times(&self, command: &str, times: u32) {
        self.failures.lock().insert(command.to_owned(), times);
    }

    pub fn report_unhealthy(&self, channel: Channel) {
        self.unhealthy.lock().push(channel);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn calls_on(&self, channel: Channel) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.lock().len()
    }

    pub fn probes(&self) -> Vec<Channel> {
        self.probes.lock().clone()
    }

    pub fn max_in_flight(&self, channel: Channel) -> usize {
        self.max_in_flight.lock().get(&channel).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CommandSink for MockSink {
    async fn invoke(
        &self,
        channel: Channel,
        command: &str,
        _payload: Option<&Value>,
    ) -> Result<CommandReply, CoreError> {
        self.calls.lock().push((channel, command.to_owned()));
        {
            let mut in_flight = self.in_flight.lock();
            let now = in_flight.entry(channel).or_default();
            *now += 1;
            let mut max = self.max_in_flight.lock();
            let peak = max.entry(channel).or_default();
            *peak = (*peak).max(*now);
        }

        tokio::time::sleep(self.latency).await;

        *self.in_flight.lock().entry(channel).or_default() -= 1;

        let mut failures = self.failures.lock();
        match failures.get_mut(command) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(CommandReply::failed("kart meşgul"))
            }
            _ => Ok(CommandReply::ok(format!("{command} tamam"))),
        }
    }

    async fn probe(&self, channel: Channel) -> Result<ProbeReply, CoreError> {
        self.probes.lock().push(channel);
        tokio::time::sleep(self.latency).await;
        Ok(ProbeReply {
            healthy: !self.unhealthy.lock().contains(&channel),
            message: None,
        })
    }
}

// ── Mode source ──────────────────────────────────────────────────────

pub struct MockMode {
    mode: Mutex<Mode>,
    polls: AtomicUsize,
}

impl MockMode {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            polls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModeSource for MockMode {
    async fn current_mode(&self) -> Result<Mode, CoreError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.mode.lock())
    }
}

// ── Event source ─────────────────────────────────────────────────────

/// Hands out scripted connections in order; once the script runs out,
/// every further connection stays open and silent.
#[derive(Default)]
pub struct MockFeed {
    scripts: Mutex<VecDeque<mpsc::UnboundedReceiver<String>>>,
    opens: AtomicUsize,
}

impl MockFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one connection. Send frames on the returned sender; drop it
    /// to simulate the peer closing.
    pub fn script_connection(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(rx);
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

struct MockConnection {
    frames: Option<mpsc::UnboundedReceiver<String>>,
}

#[async_trait]
impl EventConnection for MockConnection {
    async fn next_frame(&mut self) -> Option<Result<String, CoreError>> {
        match self.frames.as_mut() {
            Some(rx) => rx.recv().await.map(Ok),
            None => futures_util::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl EventSource for MockFeed {
    async fn open(&self) -> Result<Box<dyn EventConnection>, CoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let frames = self.scripts.lock().pop_front();
        Ok(Box::new(MockConnection { frames }))
    }
}
