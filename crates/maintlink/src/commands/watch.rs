//! Long-running console: mode supervisor, health probes, pollers, feed.
//!
//! Everything the console publishes is printed as it happens, along with
//! the results of the background pollers. Runs until Ctrl-C (or
//! `--seconds`), then shuts the console down cleanly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use maintlink_api::BoardClient;
use maintlink_core::{Console, ConsoleEvent, SettleOutcome, StreamEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;
use crate::session::Session;

// ── Poller output ────────────────────────────────────────────────────

/// One background poll result.
#[derive(Debug, Serialize)]
struct Polled {
    poller: &'static str,
    data: Value,
}

/// Either half of what `watch` prints.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Line {
    Event(ConsoleEvent),
    Polled(Polled),
}

#[derive(Debug, Serialize)]
struct Stamped {
    at: DateTime<Utc>,
    #[serde(flatten)]
    line: Line,
}

type PollFn = fn(Arc<BoardClient>) -> BoxFuture<'static, Result<Value, maintlink_api::Error>>;

fn poll_sensor_values(client: Arc<BoardClient>) -> BoxFuture<'static, Result<Value, maintlink_api::Error>> {
    Box::pin(async move { client.fetch("sensor/son-deger").await })
}

fn poll_general_status(client: Arc<BoardClient>) -> BoxFuture<'static, Result<Value, maintlink_api::Error>> {
    Box::pin(async move {
        let status = client.system_status().await?;
        Ok(serde_json::to_value(status).unwrap_or(Value::Null))
    })
}

fn poll_fill_level(client: Arc<BoardClient>) -> BoxFuture<'static, Result<Value, maintlink_api::Error>> {
    Box::pin(async move { client.fetch("hazne/doluluk").await })
}

/// Register the standard pollers; each forwards its result to `out`.
async fn register_pollers(
    session: &Session,
    console: &Console,
    out: &mpsc::UnboundedSender<Polled>,
) -> Result<(), CliError> {
    let pollers: [(&'static str, Option<Duration>, PollFn); 3] = [
        ("sensor-values", session.config.pollers.sensor_values(), poll_sensor_values),
        ("general-status", session.config.pollers.general_status(), poll_general_status),
        ("fill-level", session.config.pollers.fill_level(), poll_fill_level),
    ];

    for (name, interval, poll) in pollers {
        let Some(interval) = interval else {
            tracing::debug!(poller = name, "disabled in config");
            continue;
        };
        let client = Arc::clone(&session.client);
        let out = out.clone();
        console
            .register_producer(name, interval, move || {
                let client = Arc::clone(&client);
                let out = out.clone();
                Box::pin(async move {
                    match poll(client).await {
                        Ok(data) => {
                            let _ = out.send(Polled { poller: name, data });
                        }
                        Err(e) => tracing::warn!(poller = name, error = %e, "poll failed"),
                    }
                })
            })
            .await?;
    }
    Ok(())
}

// ── Rendering ────────────────────────────────────────────────────────

fn stream_detail(event: &StreamEvent) -> String {
    match event {
        StreamEvent::MotorTelemetry { motor_type, data, .. } => format!("motor {motor_type} {data}"),
        StreamEvent::SensorReading { data, .. } => match event.weight_grams() {
            Some(grams) => format!("sensor {grams:.1} g"),
            None => format!("sensor {data}"),
        },
        StreamEvent::SystemStatus { data, .. } => format!("status {data}"),
        StreamEvent::AlarmState { data, .. } => format!("alarm {data}"),
        StreamEvent::RawSensorMessage { text } => format!("raw {text}"),
    }
}

fn event_detail(event: &ConsoleEvent, color: bool) -> (&'static str, String) {
    match event {
        ConsoleEvent::Settled(s) => {
            let outcome = match &s.outcome {
                SettleOutcome::Ok { .. } => output::paint_ok("ok", true, color),
                SettleOutcome::Failed { reason } => output::paint_ok(&format!("failed: {reason}"), false, color),
                SettleOutcome::Cancelled => "cancelled".into(),
            };
            ("settled", format!("{} {} {outcome} ({} attempts)", s.channel, s.label, s.attempts))
        }
        ConsoleEvent::HealthChanged { channel, health } => {
            ("health", format!("{channel} {}", output::paint_health(*health, color)))
        }
        ConsoleEvent::ModeChanged { mode } => ("mode", mode.to_string()),
        ConsoleEvent::Stream(stream_event) => ("feed", stream_detail(stream_event)),
        ConsoleEvent::StreamStatus { state } => ("stream", state.to_string()),
    }
}

fn render(stamped: &Stamped, format: &OutputFormat, color: bool) -> String {
    match format {
        OutputFormat::Json => output::render_json(stamped, false),
        OutputFormat::JsonCompact => output::render_json(stamped, true),
        OutputFormat::Table | OutputFormat::Plain => {
            let (kind, detail) = match &stamped.line {
                Line::Event(event) => event_detail(event, color),
                Line::Polled(p) => ("poll", format!("{} {}", p.poller, p.data)),
            };
            if matches!(format, OutputFormat::Plain) {
                format!("{kind} {detail}")
            } else {
                format!("{}  {kind:<8} {detail}", stamped.at.format("%H:%M:%S"))
            }
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let console = session.console(session.console_config(!args.no_stream)?)?;
    let color = output::should_color(&global.color);

    let (poll_tx, mut polled) = mpsc::unbounded_channel();
    if !args.no_pollers {
        if let Err(e) = register_pollers(session, &console, &poll_tx).await {
            console.shutdown().await;
            return Err(e);
        }
    }

    let mut events = console.events();
    console.start().await;
    if !global.quiet {
        eprintln!("watching {} (Ctrl-C to stop)", session.client.base_url());
    }

    let deadline = async {
        match args.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            () = &mut deadline => break,
            Some(p) = polled.recv() => Line::Polled(p),
            event = events.recv() => match event {
                Ok(event) => Line::Event(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "output fell behind, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let stamped = Stamped { at: Utc::now(), line };
        output::print_output(&render(&stamped, &global.output, color), global.quiet);
    }

    console.shutdown().await;
    Ok(())
}
