//! Certificate inspection through a full cycle

use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, Utc};
use rcgen::{CertificateParams, DnType, KeyPair, date_time_ymd};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use uptime_watch::actors::cycle::run_cycle;
use uptime_watch::models::{CheckStatus, Monitor};
use uptime_watch::storage::{MemoryStore, MonitorStore};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

/// TLS listener serving a self-signed certificate that expires at midnight
/// UTC on `expires_on`
async fn start_tls_target(expires_on: NaiveDate) -> u16 {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params
        .distinguished_name
        .push(DnType::OrganizationName, "Uptime Test CA");
    params.not_before = date_time_ymd(2020, 1, 1);
    params.not_after = date_time_ymd(
        expires_on.year(),
        expires_on.month() as u8,
        expires_on.day() as u8,
    );
    let cert = params.self_signed(&key_pair).unwrap();

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(
        vec![cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    )
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(socket).await;
            });
        }
    });

    port
}

fn days_from_today(days: i64) -> NaiveDate {
    let today = Utc::now().date_naive();
    if days >= 0 {
        today + Days::new(days as u64)
    } else {
        today - Days::new(days.unsigned_abs())
    }
}

fn https_monitor(id: i64, port: u16) -> Monitor {
    let mut monitor = create_http_monitor(id, &format!("https://127.0.0.1:{port}/"));
    monitor.name = "secure-api".to_string();
    // keep incidents out of the relay log
    monitor.retries = Some(10);
    monitor
}

#[tokio::test]
async fn test_expiring_certificate_is_stored_and_announced() {
    // midnight eight days out is between seven and eight days away
    let port = start_tls_target(days_from_today(8)).await;
    let relay = start_relay().await;

    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("ops")).await.unwrap();
    let monitor = https_monitor(1, port);
    store.upsert_monitor(&monitor).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    let mut events = ctx.events.subscribe();
    run_cycle(&ctx, monitor).await;

    let ssl = store.get_monitor(1).await.unwrap().unwrap().ssl.unwrap();
    assert_eq!(ssl.days_until_expiry, 7);
    assert_eq!(ssl.issuer, "Uptime Test CA");
    assert!(ssl.valid);

    // the untrusted certificate fails the request, its metadata is kept anyway
    let event = events.recv().await.unwrap();
    assert_eq!(event.check.status, CheckStatus::Down);
    assert_eq!(event.ssl, Some(ssl));

    assert_eq!(
        relay_titles(&relay).await,
        vec!["⚠️ SSL Certificate Expiring Soon: secure-api".to_string()]
    );
}

#[tokio::test]
async fn test_certificate_outside_alert_days_is_quiet() {
    let port = start_tls_target(days_from_today(9)).await;
    let relay = start_relay().await;

    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("ops")).await.unwrap();
    let monitor = https_monitor(1, port);
    store.upsert_monitor(&monitor).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    run_cycle(&ctx, monitor).await;

    let ssl = store.get_monitor(1).await.unwrap().unwrap().ssl.unwrap();
    assert_eq!(ssl.days_until_expiry, 8);
    assert!(relay_titles(&relay).await.is_empty());
}

#[tokio::test]
async fn test_expired_certificate_is_announced_every_cycle() {
    let port = start_tls_target(days_from_today(-2)).await;
    let relay = start_relay().await;

    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("ops")).await.unwrap();
    let monitor = https_monitor(1, port);
    store.upsert_monitor(&monitor).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    run_cycle(&ctx, monitor.clone()).await;
    run_cycle(&ctx, monitor).await;

    let ssl = store.get_monitor(1).await.unwrap().unwrap().ssl.unwrap();
    assert!(ssl.days_until_expiry <= 0);
    assert!(!ssl.valid);

    let expired = "❌ SSL Certificate EXPIRED: secure-api".to_string();
    assert_eq!(relay_titles(&relay).await, vec![expired.clone(), expired]);
}

#[tokio::test]
async fn test_alert_sent_when_certificate_cannot_be_stored() {
    let port = start_tls_target(days_from_today(8)).await;
    let relay = start_relay().await;

    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("ops")).await.unwrap();

    // never upserted, so recording the certificate fails
    let monitor = https_monitor(2, port);
    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    run_cycle(&ctx, monitor).await;

    assert!(store.get_monitor(2).await.unwrap().is_none());
    assert_eq!(store.check_count(2).await, 1);
    assert_eq!(
        relay_titles(&relay).await,
        vec!["⚠️ SSL Certificate Expiring Soon: secure-api".to_string()]
    );
}

#[tokio::test]
async fn test_plain_http_never_gets_certificate_fields() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    let relay = start_relay().await;

    let store = Arc::new(MemoryStore::new());
    let monitor = create_http_monitor(3, &target.uri());
    store.upsert_monitor(&monitor).await.unwrap();

    let ctx = create_context(store.clone(), relay_dispatcher(store.clone(), &relay));
    run_cycle(&ctx, monitor).await;

    assert_eq!(store.latest_checks(3, 1).await.unwrap()[0].status, CheckStatus::Up);
    assert!(store.get_monitor(3).await.unwrap().unwrap().ssl.is_none());
}
