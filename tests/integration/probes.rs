//! Probe executors against local targets

use std::time::{Duration, Instant};

use uptime_watch::models::{CheckStatus, ProbeKind};
use uptime_watch::probes::ProbeSet;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_http_expected_status_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut monitor = create_http_monitor(1, &format!("{}/health", server.uri()));
    monitor.expected_status = Some(200);

    let outcome = ProbeSet::new()
        .unwrap()
        .run(&monitor, Duration::from_secs(2))
        .await;

    assert_eq!(outcome.status, CheckStatus::Down);
    assert!(outcome.error.unwrap().contains("500"));
    assert!(outcome.latency_ms.is_some(), "a response arrived, so latency is known");
    assert!(outcome.ssl.is_none());
}

#[tokio::test]
async fn test_http_redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probes = ProbeSet::new().unwrap();
    let mut monitor = create_http_monitor(1, &format!("{}/old", server.uri()));

    monitor.expected_status = Some(301);
    let outcome = probes.run(&monitor, Duration::from_secs(2)).await;
    assert_eq!(outcome.status, CheckStatus::Up);

    monitor.expected_status = Some(200);
    let outcome = probes.run(&monitor, Duration::from_secs(2)).await;
    assert_eq!(outcome.status, CheckStatus::Down);
    assert_eq!(outcome.error.as_deref(), Some("Status 301"));

    let hits = server.received_requests().await.unwrap();
    assert!(hits.iter().all(|request| request.url.path() == "/old"));
}

#[tokio::test]
async fn test_http_content_pattern() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"db\":\"degraded\"}"))
        .mount(&server)
        .await;

    let probes = ProbeSet::new().unwrap();
    let mut monitor = create_http_monitor(1, &format!("{}/status", server.uri()));
    monitor.expected_status = Some(200);

    monitor.content_pattern = Some("\"db\":\"ok\"".to_string());
    let outcome = probes.run(&monitor, Duration::from_secs(2)).await;
    assert_eq!(outcome.status, CheckStatus::Down);
    assert_eq!(outcome.error.as_deref(), Some("Content mismatch"));

    monitor.content_pattern = Some("db.+degraded".to_string());
    let outcome = probes.run(&monitor, Duration::from_secs(2)).await;
    assert_eq!(outcome.status, CheckStatus::Up);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_http_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let monitor = create_http_monitor(1, &server.uri());

    let start = Instant::now();
    let outcome = ProbeSet::new()
        .unwrap()
        .run(&monitor, Duration::from_millis(200))
        .await;

    assert_eq!(outcome.status, CheckStatus::Down);
    assert_eq!(outcome.error.as_deref(), Some("timeout"));
    assert!(outcome.latency_ms.is_none());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_tcp_open_and_closed_ports() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let probes = ProbeSet::new().unwrap();

    let outcome = probes
        .run(&create_tcp_monitor(1, open), Duration::from_secs(1))
        .await;
    assert_eq!(outcome.status, CheckStatus::Up);
    assert!(outcome.latency_ms.is_some());

    let closed = closed_port().await;
    let start = Instant::now();
    let outcome = probes
        .run(&create_tcp_monitor(2, closed), Duration::from_secs(1))
        .await;
    assert_eq!(outcome.status, CheckStatus::Down);
    assert!(outcome.error.is_some());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_dns_resolves_localhost() {
    let monitor = create_monitor(1, ProbeKind::Dns, "localhost");
    let outcome = ProbeSet::new()
        .unwrap()
        .run(&monitor, Duration::from_secs(2))
        .await;

    assert_eq!(outcome.status, CheckStatus::Up);
}

#[tokio::test]
async fn test_unknown_kind_is_down() {
    let monitor = create_monitor(1, ProbeKind::Unknown("smtp".to_string()), "mail.local");
    let outcome = ProbeSet::new()
        .unwrap()
        .run(&monitor, Duration::from_secs(1))
        .await;

    assert_eq!(outcome.status, CheckStatus::Down);
    assert_eq!(outcome.error.as_deref(), Some("unknown monitor type: smtp"));
    assert!(outcome.latency_ms.is_none());
}
