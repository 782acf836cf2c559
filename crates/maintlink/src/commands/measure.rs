//! Continuous weight measurement under the exclusive sensor lock.
//!
//! The measurement command runs on a fixed interval while health probes are
//! held off. Readings come from the command replies and, when the feed is
//! connected, from pushed sensor readings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use maintlink_api::Board;
use maintlink_core::{CommandReply, ConsoleEvent, Mode, Operation, Resource};

use crate::cli::{GlobalOpts, MeasureArgs, OutputFormat};
use crate::error::CliError;
use crate::output;
use crate::session::Session;

use super::util;

const MEASURE_COMMAND: &str = "agirlik-olc";

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum ReadingSource {
    Reply,
    Feed,
}

impl ReadingSource {
    fn label(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Feed => "feed",
        }
    }
}

#[derive(Debug, Serialize)]
struct Reading {
    at: DateTime<Utc>,
    source: ReadingSource,
    grams: f64,
}

fn weight_from(data: &Value) -> Option<f64> {
    data.get("agirlik").and_then(Value::as_f64)
}

fn print_reading(reading: &Reading, global: &GlobalOpts) {
    let line = match global.output {
        OutputFormat::Table => format!(
            "{}  {:>9.1} g  ({})",
            reading.at.format("%H:%M:%S%.3f"),
            reading.grams,
            reading.source.label(),
        ),
        OutputFormat::Plain => reading.grams.to_string(),
        // One object per line so the stream stays parseable
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(reading, true),
    };
    output::print_output(&line, global.quiet);
}

/// Count, min, max, mean.
fn summarize(weights: &[f64]) -> Option<(usize, f64, f64, f64)> {
    if weights.is_empty() {
        return None;
    }
    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let mean = weights.iter().sum::<f64>() / weights.len() as f64;
    Some((weights.len(), min, max, mean))
}

/// Measurement operation that also forwards each reply's payload.
fn measurement_operation(session: &Session, replies: mpsc::UnboundedSender<Value>) -> Operation {
    let client = Arc::clone(&session.client);
    Operation::new(MEASURE_COMMAND, move || {
        let client = Arc::clone(&client);
        let replies = replies.clone();
        Box::pin(async move {
            let reply = client.invoke(Board::Sensor, MEASURE_COMMAND, None).await?;
            if let Some(data) = &reply.data {
                let _ = replies.send(data.clone());
            }
            Ok(CommandReply {
                ok: reply.is_success(),
                message: reply.message,
            })
        })
    })
}

pub async fn handle(session: &Session, args: MeasureArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let interval = match args.interval_ms {
        Some(0) => {
            return Err(CliError::Validation {
                field: "--interval-ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Some(ms) => Duration::from_millis(ms),
        None => session.config.measurement.interval(),
    };

    let mut console_config = session.console_config(true)?;
    console_config.health.enabled = false;
    let console = session.console(console_config)?;

    if util::sync_mode(session, &console, false).await? == Mode::Inactive {
        console.shutdown().await;
        return Err(CliError::NotInMaintenance);
    }

    let mut events = console.events();
    let (reply_tx, mut replies) = mpsc::unbounded_channel();
    console.start().await;
    if let Err(e) = console
        .begin_repeating_exclusive(
            Resource::WeightMeasurement,
            interval,
            measurement_operation(session, reply_tx),
        )
        .await
    {
        console.shutdown().await;
        return Err(e.into());
    }

    if !global.quiet {
        eprintln!(
            "measuring for {}s every {}ms (Ctrl-C to stop)",
            args.seconds,
            interval.as_millis()
        );
    }

    let mut weights = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let reading = tokio::select! {
            () = &mut deadline => break,
            _ = &mut ctrl_c => break,
            Some(data) = replies.recv() => weight_from(&data).map(|grams| Reading {
                at: Utc::now(),
                source: ReadingSource::Reply,
                grams,
            }),
            event = events.recv() => match event {
                Ok(ConsoleEvent::Stream(stream_event)) => stream_event.weight_grams().map(|grams| Reading {
                    at: Utc::now(),
                    source: ReadingSource::Feed,
                    grams,
                }),
                Ok(ConsoleEvent::ModeChanged { mode: Mode::Inactive }) => {
                    tracing::warn!("maintenance mode ended, stopping measurement");
                    break;
                }
                Ok(_) => None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "measurement output lagged");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if let Some(reading) = reading {
            weights.push(reading.grams);
            print_reading(&reading, global);
        }
    }

    console.set_exclusive_operation(Resource::WeightMeasurement, false)?;
    console.shutdown().await;

    if !global.quiet {
        match summarize(&weights) {
            Some((count, min, max, mean)) => eprintln!(
                "{count} readings, min {min:.1} g, max {max:.1} g, mean {mean:.1} g"
            ),
            None => eprintln!("no readings received"),
        }
    }
    Ok(())
}
