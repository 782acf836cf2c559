//! Single health probe cycle.

use serde::Serialize;
use tabled::Tabled;

use maintlink_core::{Channel, Health, ProbeCycle};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;
use crate::session::Session;

#[derive(Debug, Serialize)]
struct ProbeResult {
    channel: Channel,
    health: Health,
}

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Health")]
    health: String,
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let mut console_config = session.console_config(false)?;
    // One cycle on demand, no periodic producer
    console_config.health.enabled = false;
    let console = session.console(console_config)?;

    let spinner = super::util::spinner("probing boards", global);
    let cycle = console.probe_all().await;
    spinner.finish_and_clear();
    console.shutdown().await;

    let results: Vec<ProbeResult> = match cycle {
        ProbeCycle::Completed(results) => results
            .into_iter()
            .map(|(channel, health)| ProbeResult { channel, health })
            .collect(),
        // A fresh console has no queued work or exclusive flags
        ProbeCycle::Skipped(reason) => {
            return Err(CliError::Board {
                message: format!("probe cycle skipped: {reason:?}"),
            });
        }
        ProbeCycle::AlreadyRunning => Vec::new(),
    };

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &results,
        |r| ProbeRow {
            channel: r.channel.to_string(),
            health: output::paint_health(r.health, color),
        },
        |r| format!("{} {}", r.channel, r.health),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
