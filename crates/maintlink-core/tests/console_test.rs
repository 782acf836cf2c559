// Scenario tests for the console: queues, probes, producers, and the feed
// driven together through in-memory fakes on a paused clock.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use maintlink_core::{
    Channel, CommandSink, Console, ConsoleConfig, ConsoleEvent, EventSource, Health, HEALTH_PROBE_PRODUCER,
    Mode, ModeSource, Priority, ProbeCycle, Resource, SettleOutcome, Settlement, SkipReason, StreamState,
};

use support::{MockFeed, MockMode, MockSink};

const LATENCY: Duration = Duration::from_millis(100);

fn console_with(sink: &Arc<MockSink>) -> Console {
    let sink: Arc<dyn CommandSink> = Arc::clone(sink) as Arc<dyn CommandSink>;
    Console::builder(ConsoleConfig::default(), sink).build()
}

async fn active_console(sink: &Arc<MockSink>) -> Console {
    let console = console_with(sink);
    console.on_mode_change(Mode::Active).await;
    console
}

fn drain_settlements(rx: &mut broadcast::Receiver<ConsoleEvent>) -> Vec<Settlement> {
    let mut settled = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ConsoleEvent::Settled(settlement) = event {
            settled.push(settlement);
        }
    }
    settled
}

// ── Queue ordering and retries ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn at_most_one_command_in_flight_per_channel() {
    let sink = MockSink::new(LATENCY);
    let console = active_console(&sink).await;

    for i in 0..5 {
        console.submit_command(Channel::Motor, format!("motor-{i}"), None, Priority::Normal);
        console.submit_command(Channel::Sensor, format!("sensor-{i}"), None, Priority::Normal);
    }
    console.wait_idle().await;

    assert_eq!(sink.max_in_flight(Channel::Motor), 1);
    assert_eq!(sink.max_in_flight(Channel::Sensor), 1);
    assert_eq!(sink.calls_on(Channel::Motor).len(), 5);
    assert_eq!(sink.calls_on(Channel::Sensor).len(), 5);
}

#[tokio::test(start_paused = true)]
async fn every_command_settles_exactly_once() {
    let sink = MockSink::new(LATENCY);
    sink.fail_times("kalibre", 10);
    let console = active_console(&sink).await;

    let settled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&settled);
    console.on_settled(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let doomed = console.submit_command(Channel::Sensor, "kalibre", None, Priority::Normal);
    let fine = console.submit_command(Channel::Sensor, "sifirla", None, Priority::Normal);

    let doomed = doomed.settled().await.unwrap();
    let fine = fine.settled().await.unwrap();
    console.wait_idle().await;

    // Budget of 3 retries means 4 attempts, then one failed settlement
    assert_eq!(doomed.attempts, 4);
    assert!(matches!(doomed.outcome, SettleOutcome::Failed { .. }));
    assert_eq!(fine.attempts, 1);
    assert!(fine.is_ok());
    assert_eq!(settled.load(Ordering::SeqCst), 2);
    assert_eq!(
        sink.calls_on(Channel::Sensor),
        vec!["kalibre", "kalibre", "kalibre", "kalibre", "sifirla"]
    );
}

#[tokio::test(start_paused = true)]
async fn high_priority_runs_after_in_flight_before_queued() {
    let sink = MockSink::new(LATENCY);
    let console = active_console(&sink).await;

    console.submit_command(Channel::Motor, "a", None, Priority::Normal);
    console.submit_command(Channel::Motor, "b", None, Priority::Normal);
    console.submit_command(Channel::Motor, "c", None, Priority::Normal);
    // Let `a` go in flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    console.submit_command(Channel::Motor, "acil-dur", None, Priority::High);

    console.wait_idle().await;
    assert_eq!(sink.calls_on(Channel::Motor), vec!["a", "acil-dur", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn retry_is_not_interleaved_with_later_commands() {
    let sink = MockSink::new(LATENCY);
    sink.fail_times("cmd2", 2);
    let console = active_console(&sink).await;
    let mut rx = console.events();

    console.submit_command(Channel::Motor, "cmd1", None, Priority::Normal);
    console.submit_command(Channel::Motor, "cmd2", None, Priority::Normal);
    let last = console.submit_command(Channel::Motor, "cmd3", None, Priority::Normal);
    last.settled().await.unwrap();

    assert_eq!(sink.calls_on(Channel::Motor), vec!["cmd1", "cmd2", "cmd2", "cmd2", "cmd3"]);

    let settled = drain_settlements(&mut rx);
    let summary: Vec<(String, bool, u32)> = settled
        .iter()
        .map(|s| (s.label.clone(), s.is_ok(), s.attempts))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("cmd1".to_owned(), true, 1),
            ("cmd2".to_owned(), true, 3),
            ("cmd3".to_owned(), true, 1),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn high_priority_during_retry_delay_runs_after_the_retry() {
    let sink = MockSink::new(LATENCY);
    sink.fail_times("cmd2", 1);
    let console = active_console(&sink).await;

    console.submit_command(Channel::Motor, "cmd2", None, Priority::Normal);
    console.submit_command(Channel::Motor, "cmd3", None, Priority::Normal);
    // cmd2 failed at t=100 and waits out the retry delay
    tokio::time::sleep(Duration::from_millis(300)).await;
    console.submit_command(Channel::Motor, "acil-dur", None, Priority::High);

    console.wait_idle().await;
    assert_eq!(sink.calls_on(Channel::Motor), vec!["cmd2", "cmd2", "acil-dur", "cmd3"]);
}

#[tokio::test(start_paused = true)]
async fn inactive_mode_mid_queue_keeps_pending_entries() {
    let sink = MockSink::new(LATENCY);
    let console = active_console(&sink).await;

    let first = console.submit_command(Channel::Sensor, "s1", None, Priority::Normal);
    let _second = console.submit_command(Channel::Sensor, "s2", None, Priority::Normal);
    let third = console.submit_command(Channel::Sensor, "s3", None, Priority::Normal);
    tokio::time::sleep(Duration::from_millis(10)).await;

    console.on_mode_change(Mode::Inactive).await;

    // In-flight command settles normally
    assert!(first.settled().await.unwrap().is_ok());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.calls_on(Channel::Sensor), vec!["s1"]);
    assert_eq!(console.status().queues[0].pending, 2);
    // Its result did not count toward health while inactive
    assert_eq!(console.health(Channel::Sensor), Health::Unknown);

    console.on_mode_change(Mode::Active).await;
    assert!(third.settled().await.unwrap().is_ok());
    assert_eq!(sink.calls_on(Channel::Sensor), vec!["s1", "s2", "s3"]);
}

#[tokio::test(start_paused = true)]
async fn cancel_pending_settles_queued_entries() {
    let sink = MockSink::new(LATENCY);
    let console = console_with(&sink);

    let a = console.submit_command(Channel::System, "yeniden-baslat", None, Priority::Normal);
    let b = console.submit_command(Channel::System, "yeniden-baslat", None, Priority::Normal);

    assert_eq!(console.cancel_pending(Channel::System), 2);
    assert_eq!(a.settled().await.unwrap().outcome, SettleOutcome::Cancelled);
    assert_eq!(b.settled().await.unwrap().outcome, SettleOutcome::Cancelled);
    assert!(sink.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_stall_queue() {
    let sink = MockSink::new(LATENCY);
    let console = active_console(&sink).await;
    console.on_settled(|_| panic!("handler bug"));

    let first = console.submit_command(Channel::Motor, "ileri", None, Priority::Normal);
    let second = console.submit_command(Channel::Motor, "geri", None, Priority::Normal);

    assert!(first.settled().await.unwrap().is_ok());
    assert!(second.settled().await.unwrap().is_ok());
}

// ── Health monitor ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn no_probe_while_exclusive_flag_set() {
    let sink = MockSink::new(LATENCY);
    let console = active_console(&sink).await;
    console.set_exclusive_operation(Resource::WeightMeasurement, true).unwrap();

    assert_eq!(
        console.probe_all().await,
        ProbeCycle::Skipped(SkipReason::ExclusiveActive(Resource::WeightMeasurement))
    );
    // Periodic cycles skip too
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(sink.probe_count(), 0);

    console.set_exclusive_operation(Resource::WeightMeasurement, false).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.probes(), vec![Channel::Sensor, Channel::Motor]);
}

#[tokio::test(start_paused = true)]
async fn measurement_takes_turns_with_sensor_queue() {
    let sink = MockSink::new(Duration::from_millis(400));
    let console = active_console(&sink).await;
    let measure = console.hardware_operation(Channel::Sensor, "agirlik-olc", None);
    console
        .begin_repeating_exclusive(Resource::WeightMeasurement, Duration::from_millis(500), measure)
        .await
        .unwrap();

    console.submit_command(Channel::Sensor, "s0", None, Priority::Normal);
    console.submit_command(Channel::Sensor, "s1", None, Priority::Normal);
    let last = console.submit_command(Channel::Sensor, "s2", None, Priority::Normal);
    assert!(last.settled().await.unwrap().is_ok());
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(sink.max_in_flight(Channel::Sensor), 1);
    let calls = sink.calls_on(Channel::Sensor);
    assert!(calls.iter().filter(|c| *c == "agirlik-olc").count() >= 2);
    assert_eq!(
        calls.iter().filter(|c| c.starts_with('s')).cloned().collect::<Vec<_>>(),
        vec!["s0", "s1", "s2"]
    );

    console.set_exclusive_operation(Resource::WeightMeasurement, false).unwrap();
}

#[tokio::test(start_paused = true)]
async fn probe_skipped_while_queue_has_work() {
    let sink = MockSink::new(LATENCY);
    let console = console_with(&sink);
    console.submit_command(Channel::Motor, "konveyor-ileri", None, Priority::Normal);

    assert_eq!(
        console.probe_all().await,
        ProbeCycle::Skipped(SkipReason::QueuePending(Channel::Motor))
    );
    assert_eq!(sink.probe_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reachable_but_unhealthy_board_is_unhealthy() {
    let sink = MockSink::new(LATENCY);
    sink.report_unhealthy(Channel::Motor);
    let console = active_console(&sink).await;

    let ProbeCycle::Completed(results) = console.probe_all().await else {
        panic!("probe cycle did not run");
    };
    assert_eq!(results.get(&Channel::Sensor), Some(&Health::Healthy));
    assert_eq!(results.get(&Channel::Motor), Some(&Health::Unhealthy));
    assert_eq!(console.health(Channel::Motor), Health::Unhealthy);
    assert_eq!(console.health(Channel::System), Health::Unknown);

    console.on_mode_change(Mode::Inactive).await;
    assert!(console.health_snapshot().values().all(|h| *h == Health::Unknown));
}

#[tokio::test(start_paused = true)]
async fn concurrent_probe_cycles_collapse() {
    let sink = MockSink::new(Duration::from_secs(1));
    let console = active_console(&sink).await;

    let (first, second) = tokio::join!(console.probe_all(), console.probe_all());

    assert!(matches!(first, ProbeCycle::Completed(_)));
    assert_eq!(second, ProbeCycle::AlreadyRunning);
    assert_eq!(sink.probe_count(), 2);
}

// ── Mode-gated producers ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn repeated_mode_flips_never_duplicate_producers() {
    let sink = MockSink::new(LATENCY);
    let console = console_with(&sink);
    let ticks = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&ticks);
    console
        .register_producer("sensor-values", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .await
        .unwrap();

    console.on_mode_change(Mode::Active).await;
    console.on_mode_change(Mode::Inactive).await;
    console.on_mode_change(Mode::Inactive).await;
    console.on_mode_change(Mode::Active).await;
    console.on_mode_change(Mode::Active).await;

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
    assert_eq!(
        console.running_producers(),
        vec![HEALTH_PROBE_PRODUCER.to_owned(), "sensor-values".to_owned()]
    );

    console.on_mode_change(Mode::Inactive).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
    assert!(console.running_producers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mode_supervisor_follows_mode_source() {
    let sink = MockSink::new(LATENCY);
    let mode = MockMode::new(Mode::Active);
    let console = Console::builder(ConsoleConfig::default(), sink as Arc<dyn CommandSink>)
        .mode_source(Arc::clone(&mode) as Arc<dyn ModeSource>)
        .build();

    console.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(console.mode(), Mode::Active);

    mode.set(Mode::Inactive);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(console.mode(), Mode::Inactive);
    assert!(mode.polls() >= 2);

    console.shutdown().await;
}

// ── Event stream ─────────────────────────────────────────────────────

fn streaming_console(sink: &Arc<MockSink>, feed: &Arc<MockFeed>) -> Console {
    Console::builder(ConsoleConfig::default(), Arc::clone(sink) as Arc<dyn CommandSink>)
        .event_source(Arc::clone(feed) as Arc<dyn EventSource>)
        .build()
}

#[tokio::test(start_paused = true)]
async fn feed_drop_while_active_reconnects_once() {
    let sink = MockSink::new(LATENCY);
    let feed = MockFeed::new();
    let tx = feed.script_connection();
    let console = streaming_console(&sink, &feed);

    console.on_mode_change(Mode::Active).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(console.stream_state(), StreamState::Connected);

    drop(tx);
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(feed.opens(), 2);
    assert_eq!(console.stream().map(|s| s.reconnect_attempts()), Some(1));
    assert_eq!(console.stream_state(), StreamState::Connected);
}

#[tokio::test(start_paused = true)]
async fn feed_drop_after_inactive_does_not_reconnect() {
    let sink = MockSink::new(LATENCY);
    let feed = MockFeed::new();
    let tx = feed.script_connection();
    let console = streaming_console(&sink, &feed);

    console.on_mode_change(Mode::Active).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    console.on_mode_change(Mode::Inactive).await;
    drop(tx);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(feed.opens(), 1);
    assert_eq!(console.stream().map(|s| s.reconnect_attempts()), Some(0));
    assert_eq!(console.stream_state(), StreamState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn feed_events_reach_kind_handlers_and_drive_mode() {
    let sink = MockSink::new(LATENCY);
    let feed = MockFeed::new();
    let tx = feed.script_connection();
    let console = streaming_console(&sink, &feed);

    let weights = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = Arc::clone(&weights);
    console.on_stream_kind(vec![maintlink_core::StreamEventKind::SensorReading], move |event| {
        if let Some(grams) = event.weight_grams() {
            seen.lock().push(grams);
        }
    });

    console.start().await;
    console.on_mode_change(Mode::Active).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    tx.send("WebSocket bağlantısı kuruldu!".into()).unwrap();
    tx.send(r#"{"type":"sensor_update","data":{"agirlik":120.5}}"#.into()).unwrap();
    tx.send("{broken".into()).unwrap();
    tx.send(r#"{"type":"sensor_update","data":{"agirlik":121.0}}"#.into()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*weights.lock(), vec![120.5, 121.0]);

    // Service reports the session ended
    tx.send(r#"{"type":"system_status","data":{"durum":"oturum_yok"}}"#.into()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(console.mode(), Mode::Inactive);
    assert_eq!(console.stream_state(), StreamState::Disconnected);

    console.shutdown().await;
}

// ── Stream adapters ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stream_adapters_follow_mode_and_settlements() {
    use tokio_stream::StreamExt;

    let sink = MockSink::new(LATENCY);
    let console = console_with(&sink);
    let mut modes = console.mode_stream();
    let events = console.event_stream();
    tokio::pin!(events);

    assert_eq!(modes.next().await, Some(Mode::Inactive));
    console.on_mode_change(Mode::Active).await;
    assert_eq!(modes.next().await, Some(Mode::Active));

    let handle = console.submit_command(Channel::System, "durum-yenile", None, Priority::Normal);
    let id = handle.id();

    let settled = loop {
        match events.next().await {
            Some(ConsoleEvent::Settled(settlement)) => break settlement,
            Some(_) => {}
            None => panic!("event stream ended"),
        }
    };
    assert_eq!(settled.id, id);
    assert!(settled.is_ok());
}
