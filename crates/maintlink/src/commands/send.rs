//! One-shot board command through the channel queue.

use serde_json::Value;

use maintlink_core::{Channel, Mode, Priority, SettleOutcome, Settlement};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;
use crate::session::Session;

use super::util;

fn detail(settlement: &Settlement, color: bool) -> String {
    let (result, note) = match &settlement.outcome {
        SettleOutcome::Ok { message } => ("ok", message.clone().unwrap_or_default()),
        SettleOutcome::Failed { reason } => ("failed", reason.clone()),
        SettleOutcome::Cancelled => ("cancelled", String::new()),
    };
    let elapsed = settlement.settled_at - settlement.enqueued_at;
    output::render_detail(&[
        ("Channel", settlement.channel.to_string()),
        ("Command", settlement.label.clone()),
        ("Result", output::paint_ok(result, settlement.is_ok(), color)),
        ("Message", note),
        ("Attempts", settlement.attempts.to_string()),
        ("Elapsed", format!("{}ms", elapsed.num_milliseconds())),
    ])
}

pub async fn handle(
    session: &Session,
    args: SendArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let channel = Channel::from(args.channel);
    let payload: Option<Value> = args.payload.as_deref().map(serde_json::from_str).transpose()?;
    let priority = if args.high { Priority::High } else { Priority::Normal };

    let mut console_config = session.console_config(false)?;
    console_config.health.enabled = false;
    let console = session.console(console_config)?;

    if util::sync_mode(session, &console, args.force).await? == Mode::Inactive {
        if !args.force {
            console.shutdown().await;
            return Err(CliError::NotInMaintenance);
        }
        tracing::warn!("machine is not in maintenance mode, sending anyway");
    }

    let spinner = util::spinner(format!("{channel} {}", args.command), global);
    let handle = console.submit_command(channel, args.command.clone(), payload, priority);
    let settled = handle.settled().await;
    spinner.finish_and_clear();
    let settlement = settled?;
    console.shutdown().await;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &settlement,
        |s| detail(s, color),
        |s| match &s.outcome {
            SettleOutcome::Ok { message } => message.clone().unwrap_or_else(|| "ok".into()),
            SettleOutcome::Failed { reason } => reason.clone(),
            SettleOutcome::Cancelled => "cancelled".into(),
        },
    );
    output::print_output(&out, global.quiet);

    match settlement.outcome {
        SettleOutcome::Ok { .. } => Ok(()),
        SettleOutcome::Failed { reason } => Err(CliError::CommandFailed {
            channel: channel.to_string(),
            command: args.command,
            attempts: settlement.attempts,
            reason,
        }),
        SettleOutcome::Cancelled => Err(CliError::CommandFailed {
            channel: channel.to_string(),
            command: args.command,
            attempts: 0,
            reason: "cancelled before it ran".into(),
        }),
    }
}
