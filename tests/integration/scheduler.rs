//! Scheduler iterations driven through the handle

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use uptime_watch::actors::scheduler::{SchedulerHandle, run_iteration};
use uptime_watch::models::{CheckStatus, MaintenanceWindow};
use uptime_watch::storage::{MemoryStore, MonitorStore};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn listening_port() -> (tokio::net::TcpListener, u16) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn spawn_scheduler(store: Arc<MemoryStore>, relay: &MockServer, width: usize) -> SchedulerHandle {
    let ctx = create_context(store.clone(), relay_dispatcher(store, relay));
    SchedulerHandle::spawn(ctx, manual_scheduler(width))
}

#[tokio::test]
async fn test_paused_monitor_is_never_probed() {
    let relay = start_relay().await;
    let (_listener, port) = listening_port().await;
    let store = Arc::new(MemoryStore::new());

    let active = create_tcp_monitor(1, port);
    let mut paused = create_tcp_monitor(2, port);
    paused.is_paused = true;
    store.upsert_monitor(&active).await.unwrap();
    store.upsert_monitor(&paused).await.unwrap();

    let scheduler = spawn_scheduler(store.clone(), &relay, 4);
    let report = scheduler.tick_now().await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(store.check_count(1).await, 1);
    assert_eq!(store.check_count(2).await, 0);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_maintenance_window_suppresses_probe() {
    let relay = start_relay().await;
    let (_listener, port) = listening_port().await;
    let store = Arc::new(MemoryStore::new());

    store.upsert_monitor(&create_tcp_monitor(1, port)).await.unwrap();
    store.upsert_monitor(&create_tcp_monitor(2, port)).await.unwrap();
    store
        .save_maintenance_window(&MaintenanceWindow {
            name: "switch replacement".to_string(),
            start: Utc::now() - chrono::Duration::minutes(10),
            end: Utc::now() + chrono::Duration::minutes(10),
            monitor_ids: vec![1],
        })
        .await
        .unwrap();

    let scheduler = spawn_scheduler(store.clone(), &relay, 4);
    let report = scheduler.tick_now().await.unwrap();

    assert_eq!(report.due, 2);
    assert_eq!(report.in_maintenance, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(store.check_count(1).await, 0);
    assert_eq!(store.check_count(2).await, 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_monitor_not_due_is_skipped() {
    let relay = start_relay().await;
    let (_listener, port) = listening_port().await;
    let store = Arc::new(MemoryStore::new());
    store.upsert_monitor(&create_tcp_monitor(1, port)).await.unwrap();

    let scheduler = spawn_scheduler(store.clone(), &relay, 2);

    let first = scheduler.tick_now().await.unwrap();
    assert_eq!(first.completed, 1);

    // interval is 60s, so the next iteration finds nothing to do
    let second = scheduler.tick_now().await.unwrap();
    assert_eq!(second.due, 0);
    assert_eq!(store.check_count(1).await, 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_overdue_monitor_is_probed_again() {
    let relay = start_relay().await;
    let (_listener, port) = listening_port().await;
    let store = Arc::new(MemoryStore::new());

    let monitor = create_tcp_monitor(1, port);
    store.upsert_monitor(&monitor).await.unwrap();
    store
        .insert_check_at(
            uptime_watch::probes::ProbeOutcome::down("timeout").to_check(1),
            Utc::now() - chrono::Duration::minutes(2),
        )
        .await;

    let scheduler = spawn_scheduler(store.clone(), &relay, 2);
    let report = scheduler.tick_now().await.unwrap();

    assert_eq!(report.due, 1);
    assert_eq!(store.check_count(1).await, 2);
    let latest = store.latest_checks(1, 1).await.unwrap();
    assert_eq!(latest[0].status, CheckStatus::Up);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_pool_width_bounds_concurrency() {
    let relay = start_relay().await;
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .mount(&target)
        .await;

    let store = Arc::new(MemoryStore::new());
    for id in 1..=5 {
        store
            .upsert_monitor(&create_http_monitor(id, &format!("{}/{id}", target.uri())))
            .await
            .unwrap();
    }

    let scheduler = spawn_scheduler(store.clone(), &relay, 2);
    let report = scheduler.tick_now().await.unwrap();

    // five 100ms probes two at a time take three rounds
    assert_eq!(report.completed, 5);
    assert!(
        report.elapsed >= Duration::from_millis(300),
        "finished too fast: {:?}",
        report.elapsed
    );
    assert!(
        report.elapsed < Duration::from_millis(500),
        "finished too slow: {:?}",
        report.elapsed
    );

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_events_carry_recorded_check() {
    let relay = start_relay().await;
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut monitor = create_http_monitor(3, &target.uri());
    monitor.name = "homepage".to_string();
    store.upsert_monitor(&monitor).await.unwrap();

    let scheduler = spawn_scheduler(store.clone(), &relay, 1);
    let mut events = scheduler.subscribe();
    scheduler.tick_now().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.monitor_id, 3);
    assert_eq!(event.monitor_name, "homepage");
    assert_eq!(event.check.status, CheckStatus::Up);
    assert!(event.ssl.is_none(), "plain http never carries certificate data");

    let latest = store.latest_checks(3, 1).await.unwrap();
    assert_eq!(latest[0], event.check);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_timer_drives_iterations() {
    let relay = start_relay().await;
    let (_listener, port) = listening_port().await;
    let store = Arc::new(MemoryStore::new());
    store.upsert_monitor(&create_tcp_monitor(1, port)).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    let mut config = manual_scheduler(2);
    config.tick_ms = 20;
    let scheduler = SchedulerHandle::spawn(ctx, config);
    let mut events = scheduler.subscribe();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no check within two seconds")
        .unwrap();
    assert_eq!(event.monitor_id, 1);

    scheduler.shutdown().await;
    assert_eq!(store.check_count(1).await, 1);
}

#[tokio::test]
async fn test_unanswered_notification_does_not_stall_iteration() {
    let silent = start_silent_relay().await;
    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("ops")).await.unwrap();

    let mut monitor = create_tcp_monitor(1, closed_port().await);
    monitor.timeout_ms = Some(1000);
    store.upsert_monitor(&monitor).await.unwrap();

    let dispatcher = relay_dispatcher_at(store.clone(), silent)
        .with_delivery_timeout(Duration::from_millis(300));
    let ctx = Arc::new(create_context(store.clone(), dispatcher));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        run_iteration(ctx, Arc::new(Semaphore::new(2))),
    )
    .await
    .expect("iteration blocked on the notification channel");

    assert_eq!(report.completed, 1);
    assert!(store.open_incident(1).await.unwrap().is_some());
}

#[tokio::test]
async fn test_ticks_during_slow_iteration_are_skipped() {
    let relay = start_relay().await;
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(250)))
        .mount(&target)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut monitor = create_http_monitor(1, &target.uri());
    // due on every tick
    monitor.interval_sec = Some(0);
    store.upsert_monitor(&monitor).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    let mut config = manual_scheduler(4);
    config.tick_ms = 20;
    let scheduler = SchedulerHandle::spawn(ctx, config);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    scheduler.shutdown().await;

    let checks = store.latest_checks(1, 100).await.unwrap();
    let requests = target.received_requests().await.unwrap();

    // one probe per 250ms iteration at most, never one per 20ms tick
    assert!(
        (2..=5).contains(&checks.len()),
        "unexpected number of checks: {}",
        checks.len()
    );
    assert_eq!(requests.len(), checks.len());

    for pair in checks.windows(2) {
        let gap = pair[0].created_at - pair[1].created_at;
        assert!(
            gap >= chrono::Duration::milliseconds(200),
            "checks overlapped, only {gap} apart"
        );
    }
}
