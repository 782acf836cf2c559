//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use maintlink_core::{Channel, Console, Mode};

use crate::cli::{ChannelArg, GlobalOpts};
use crate::error::CliError;
use crate::session::Session;

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Sensor => Channel::Sensor,
            ChannelArg::Motor => Channel::Motor,
            ChannelArg::System => Channel::System,
        }
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "--yes".into(),
            reason: format!("'{message}' needs confirmation; pass --yes when not interactive"),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Spinner on stderr, hidden when quiet or not on a terminal.
pub fn spinner(message: impl Into<String>, global: &GlobalOpts) -> ProgressBar {
    if global.quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Read the machine state once and hand it to the console.
///
/// Returns the observed mode. With `force`, the console is switched on
/// regardless so its queues run.
pub async fn sync_mode(session: &Session, console: &Console, force: bool) -> Result<Mode, CliError> {
    let status = session.client.system_status().await?;
    let observed = Mode::from_active(status.is_maintenance());
    tracing::debug!(state = %status.state, %observed, "machine state");
    let effective = if force { Mode::Active } else { observed };
    console.on_mode_change(effective).await;
    Ok(observed)
}
