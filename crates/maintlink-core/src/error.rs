// ── Core error types ──
//
// Errors from maintlink-core. These are NOT transport-specific --
// consumers never see reqwest or tungstenite errors directly.
// The `From<maintlink_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.
//
// Queue, probe, and stream failures never surface here as `Err` to event
// consumers; they end up in settlements, health changes, or logs.

use thiserror::Error;

use crate::model::Resource;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach board service at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Board errors ─────────────────────────────────────────────────
    #[error("Board service error: {message}")]
    Board {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Command rejected by board: {message}")]
    Rejected { message: String },

    // ── Coordination errors ──────────────────────────────────────────
    #[error("Exclusive operation already running on {resource}")]
    ExclusiveBusy { resource: Resource },

    #[error("Event stream error: {message}")]
    Stream { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Timeout helper for `tokio::time::timeout` expiries.
    pub(crate) fn timed_out(after: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<maintlink_api::Error> for CoreError {
    fn from(err: maintlink_api::Error) -> Self {
        match err {
            maintlink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Board {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            maintlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            maintlink_api::Error::ClientSetup(message) => CoreError::Config { message },
            maintlink_api::Error::Board { status, message } => CoreError::Board {
                message,
                status: Some(status),
            },
            maintlink_api::Error::WebSocketConnect(reason) => CoreError::Stream {
                message: format!("connection failed: {reason}"),
            },
            maintlink_api::Error::WebSocketClosed { code, reason } => CoreError::Stream {
                message: format!("closed (code {code}): {reason}"),
            },
            maintlink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
