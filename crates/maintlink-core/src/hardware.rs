//! Capability interfaces the console drives.
//!
//! The core never talks HTTP or WebSocket directly. It depends on three
//! narrow traits, implemented here for the `maintlink-api` clients and by
//! in-memory fakes in tests:
//!
//! - [`CommandSink`]: request/response commands and liveness probes
//! - [`ModeSource`]: the external operating mode
//! - [`EventSource`]: a push feed of text frames

use async_trait::async_trait;
use serde_json::Value;

use maintlink_api::{BoardClient, FeedConnection, WebSocketFeed};

use crate::error::CoreError;
use crate::model::{Channel, Mode};

// ── Replies ──────────────────────────────────────────────────────────

/// Outcome of a hardware command that reached the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub ok: bool,
    pub message: Option<String>,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Outcome of a liveness probe that reached the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub healthy: bool,
    pub message: Option<String>,
}

// ── Traits ───────────────────────────────────────────────────────────

/// Request/response path to the controller boards.
///
/// Implementations must not serialize calls themselves; the console
/// guarantees at most one in-flight command per channel.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn invoke(
        &self,
        channel: Channel,
        command: &str,
        payload: Option<&Value>,
    ) -> Result<CommandReply, CoreError>;

    async fn probe(&self, channel: Channel) -> Result<ProbeReply, CoreError>;
}

/// External signal of the current operating mode.
#[async_trait]
pub trait ModeSource: Send + Sync {
    async fn current_mode(&self) -> Result<Mode, CoreError>;
}

/// Factory for push-feed connections.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn EventConnection>, CoreError>;
}

/// One open feed connection, owned by a single reader.
#[async_trait]
pub trait EventConnection: Send {
    /// `None` on clean close, `Some(Err)` on transport failure.
    async fn next_frame(&mut self) -> Option<Result<String, CoreError>>;

    async fn close(&mut self);
}

// ── maintlink-api adapters ───────────────────────────────────────────

#[async_trait]
impl CommandSink for BoardClient {
    async fn invoke(
        &self,
        channel: Channel,
        command: &str,
        payload: Option<&Value>,
    ) -> Result<CommandReply, CoreError> {
        let reply = BoardClient::invoke(self, channel.board(), command, payload).await?;
        Ok(CommandReply {
            ok: reply.is_success(),
            message: reply.message,
        })
    }

    async fn probe(&self, channel: Channel) -> Result<ProbeReply, CoreError> {
        let reply = self.ping(channel.board()).await?;
        Ok(ProbeReply {
            healthy: reply.healthy,
            message: reply.message,
        })
    }
}

#[async_trait]
impl ModeSource for BoardClient {
    async fn current_mode(&self) -> Result<Mode, CoreError> {
        let status = self.system_status().await?;
        Ok(Mode::from_active(status.is_maintenance()))
    }
}

#[async_trait]
impl EventSource for WebSocketFeed {
    async fn open(&self) -> Result<Box<dyn EventConnection>, CoreError> {
        let conn = WebSocketFeed::open(self).await?;
        Ok(Box::new(conn))
    }
}

#[async_trait]
impl EventConnection for FeedConnection {
    async fn next_frame(&mut self) -> Option<Result<String, CoreError>> {
        self.next_text().await.map(|frame| frame.map_err(CoreError::from))
    }

    async fn close(&mut self) {
        FeedConnection::close(self).await;
    }
}
