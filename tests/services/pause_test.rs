//! Tests for the stop, wait, start cycle.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use torrent_guard::pause::run_pause;

use crate::fake::FakeController;

fn elapsed_secs(start: Instant, at: Option<Instant>) -> u64 {
    at.expect("call recorded")
        .saturating_duration_since(start)
        .as_secs()
}

#[tokio::test(start_paused = true)]
async fn stops_waits_then_starts() {
    let start = Instant::now();
    let controller = FakeController::default();

    let record = run_pause(
        &controller,
        "xray.service",
        Duration::from_secs(15),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(controller.verbs(), vec!["stop", "start"]);
    assert_eq!(elapsed_secs(start, controller.time_of("stop")), 0);
    assert_eq!(elapsed_secs(start, controller.time_of("start")), 15);
    assert_eq!(record.unit, "xray.service");
    assert!(record.stopped && record.started && !record.interrupted);
}

#[tokio::test(start_paused = true)]
async fn failed_stop_still_waits_full_duration_and_starts() {
    let start = Instant::now();
    let controller = FakeController {
        fail_stop: true,
        ..FakeController::default()
    };

    let record = run_pause(
        &controller,
        "xray.service",
        Duration::from_secs(7),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(controller.verbs(), vec!["stop", "start"]);
    assert_eq!(elapsed_secs(start, controller.time_of("start")), 7);
    assert!(!record.stopped);
    assert!(record.started);
}

#[tokio::test(start_paused = true)]
async fn failed_start_is_reported_not_raised() {
    let controller = FakeController {
        fail_start: true,
        ..FakeController::default()
    };

    let record = run_pause(
        &controller,
        "v2ray.service",
        Duration::from_secs(1),
        &CancellationToken::new(),
    )
    .await;

    assert!(record.stopped);
    assert!(!record.started);
}

#[tokio::test(start_paused = true)]
async fn zero_duration_does_not_wait() {
    let start = Instant::now();
    let controller = FakeController::default();

    run_pause(
        &controller,
        "xray.service",
        Duration::ZERO,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(elapsed_secs(start, controller.time_of("start")), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_cuts_wait_short_but_starts() {
    let start = Instant::now();
    let controller = FakeController::default();
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(4)).await;
        trigger.cancel();
    });

    let record = run_pause(&controller, "xray.service", Duration::from_secs(60), &shutdown).await;

    assert!(record.interrupted);
    assert_eq!(controller.verbs(), vec!["stop", "start"]);
    assert_eq!(elapsed_secs(start, controller.time_of("start")), 4);
}
