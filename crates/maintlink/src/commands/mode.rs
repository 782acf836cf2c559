//! Maintenance mode query and switch.

use maintlink_api::SystemStatus;

use crate::cli::{GlobalOpts, ModeArgs, ModeCommand};
use crate::error::CliError;
use crate::output;
use crate::session::Session;

use super::util;

fn detail(status: &SystemStatus, color: bool) -> String {
    let maintenance = status.is_maintenance();
    let connected = |up: bool| output::paint_ok(if up { "connected" } else { "disconnected" }, up, color);
    let mut pairs = vec![
        ("State", status.state.clone()),
        (
            "Maintenance",
            output::paint_ok(if maintenance { "on" } else { "off" }, maintenance, color),
        ),
        ("Sensor board", connected(status.sensor_connected)),
        ("Motor board", connected(status.motor_connected)),
    ];
    if let Some(note) = &status.note {
        pairs.push(("Note", note.clone()));
    }
    output::render_detail(&pairs)
}

fn print_status(status: &SystemStatus, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        status,
        |s| detail(s, color),
        |s| if s.is_maintenance() { "on".into() } else { "off".into() },
    );
    output::print_output(&out, global.quiet);
}

pub async fn handle(session: &Session, args: ModeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = args.command.unwrap_or(ModeCommand::Get);
    let active = match command {
        ModeCommand::Get => {
            let status = session.client.system_status().await?;
            print_status(&status, global);
            return Ok(());
        }
        ModeCommand::On => true,
        ModeCommand::Off => {
            if !util::confirm("Leave maintenance mode? Running board work will stop.", global.yes)? {
                return Ok(());
            }
            false
        }
    };

    let reply = session.client.set_maintenance_mode(active).await?;
    if !reply.is_success() {
        return Err(CliError::CommandFailed {
            channel: "system".into(),
            command: "bakim/modu-ayarla".into(),
            attempts: 1,
            reason: reply.message.unwrap_or_else(|| reply.status.clone()),
        });
    }
    tracing::info!(active, "maintenance mode switched");

    let status = session.client.system_status().await?;
    print_status(&status, global);
    Ok(())
}
