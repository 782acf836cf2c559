//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use maintlink_config::ConfigError;
use maintlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const COMMAND_FAILED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the board service at {url}")]
    #[diagnostic(
        code(maintlink::connection_failed),
        help(
            "Check that the controller service is running.\n\
             URL: {url}\n\
             Override with --api-url or MAINTLINK_API_URL."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(maintlink::timeout),
        help("Increase the timeout with --timeout-ms or check the board service.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("{channel} command '{command}' failed after {attempts} attempt(s): {reason}")]
    #[diagnostic(code(maintlink::command_failed))]
    CommandFailed {
        channel: String,
        command: String,
        attempts: u32,
        reason: String,
    },

    #[error("The machine is not in maintenance mode")]
    #[diagnostic(
        code(maintlink::not_in_maintenance),
        help("Enter it with: maintlink mode on\nOr pass --force to send anyway.")
    )]
    NotInMaintenance,

    #[error("Exclusive operation already running on {resource}")]
    #[diagnostic(
        code(maintlink::exclusive_busy),
        help("Wait for the running operation to finish.")
    )]
    ExclusiveBusy { resource: String },

    #[error("Board service error: {message}")]
    #[diagnostic(code(maintlink::board))]
    Board { message: String },

    #[error("Event stream error: {message}")]
    #[diagnostic(code(maintlink::stream))]
    Stream { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(maintlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(maintlink::config),
        help("Inspect the resolved settings with: maintlink config show")
    )]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(maintlink::json), help("Pass the payload as a single quoted JSON object."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::CommandFailed { .. } | Self::NotInMaintenance | Self::ExclusiveBusy { .. } => {
                exit_code::COMMAND_FAILED
            }
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::Board { message, status } => Self::Board {
                message: match status {
                    Some(code) => format!("{message} (HTTP {code})"),
                    None => message,
                },
            },
            CoreError::Rejected { message } => Self::Board { message },
            CoreError::ExclusiveBusy { resource } => Self::ExclusiveBusy {
                resource: resource.to_string(),
            },
            CoreError::Stream { message } => Self::Stream { message },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::Board { message },
        }
    }
}

impl From<maintlink_api::Error> for CliError {
    fn from(err: maintlink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
