//! Notification fan-out across channels

use std::sync::Arc;
use std::time::Duration;

use uptime_watch::alerts::{Dispatcher, NotificationEvent};
use uptime_watch::channels::{DeliveryReport, PushbulletChannel, WebPushChannel, WebhookChannel};
use uptime_watch::config::Webhook;
use uptime_watch::models::{ProbeKind, PushSubscription};
use uptime_watch::storage::{MemoryStore, MonitorStore};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn event() -> NotificationEvent {
    let monitor = create_monitor(4, ProbeKind::Http, "https://billing.example.com");
    NotificationEvent::down(&monitor, Some("Status 502".to_string()))
}

#[tokio::test]
async fn test_relay_failure_is_counted_per_token() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RELAY_PATH))
        .and(header("Access-Token", "o.alice-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&relay)
        .await;
    Mock::given(method("POST"))
        .and(path(RELAY_PATH))
        .and(header("Access-Token", "o.bob-token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&relay)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("alice")).await.unwrap();
    store.save_relay_token(&relay_token("bob")).await.unwrap();

    let report = relay_dispatcher(store, &relay).dispatch(&event()).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_disabled_channels_send_nothing() {
    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&endpoint)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_push_subscription(&push_subscription(format!("{}/push/abc", endpoint.uri())))
        .await
        .unwrap();
    store.save_relay_token(&relay_token("alice")).await.unwrap();

    let client = reqwest::Client::new();
    let dispatcher = Dispatcher::new(store)
        .with_channel(Arc::new(WebPushChannel::new(
            client.clone(),
            false,
            Some(vapid()),
        )))
        .with_channel(Arc::new(PushbulletChannel::new(
            client,
            format!("{}{RELAY_PATH}", endpoint.uri()),
            false,
        )));

    let report = dispatcher.dispatch(&event()).await;

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 0);
    assert!(endpoint.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_channel_receives_the_event() {
    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/push/abc"))
        .and(header("TTL", "86400"))
        .and(header("Content-Encoding", "aes128gcm"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&endpoint)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&endpoint)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_push_subscription(&push_subscription(format!("{}/push/abc", endpoint.uri())))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let dispatcher = Dispatcher::new(store)
        .with_channel(Arc::new(WebPushChannel::new(
            client.clone(),
            true,
            Some(vapid()),
        )))
        .with_channel(Arc::new(WebhookChannel::new(
            client,
            Webhook {
                url: format!("{}/hook", endpoint.uri()),
            },
        )));

    let report = dispatcher.dispatch(&event()).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    let push = endpoint
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|request| request.url.path() == "/push/abc")
        .unwrap();

    let authorization = push.headers.get("Authorization").unwrap().to_str().unwrap();
    assert!(authorization.starts_with("vapid t="), "{authorization}");
    assert!(authorization.contains(", k="));

    // the payload is encrypted for the subscription, not readable JSON
    assert!(serde_json::from_slice::<serde_json::Value>(&push.body).is_err());
    assert!(!String::from_utf8_lossy(&push.body).contains("monitor-4 is DOWN"));
}

#[tokio::test]
async fn test_web_push_without_vapid_key_sends_nothing() {
    let endpoint = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&endpoint)
        .await;

    let store = Arc::new(MemoryStore::new());
    store
        .save_push_subscription(&push_subscription(format!("{}/push/abc", endpoint.uri())))
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(store).with_channel(Arc::new(WebPushChannel::new(
        reqwest::Client::new(),
        true,
        None,
    )));

    assert_eq!(dispatcher.dispatch(&event()).await, DeliveryReport::default());
}

#[tokio::test]
async fn test_malformed_subscription_keys_fail_delivery() {
    let endpoint = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    store
        .save_push_subscription(&PushSubscription {
            endpoint: format!("{}/push/abc", endpoint.uri()),
            p256dh: "not-a-key".to_string(),
            auth: "secret".to_string(),
        })
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(store).with_channel(Arc::new(WebPushChannel::new(
        reqwest::Client::new(),
        true,
        Some(vapid()),
    )));

    let report = dispatcher.dispatch(&event()).await;
    assert_eq!(report.failed, 1);
    assert!(endpoint.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unanswered_channel_is_abandoned() {
    let silent = start_silent_relay().await;
    let store = Arc::new(MemoryStore::new());
    store.save_relay_token(&relay_token("alice")).await.unwrap();

    let dispatcher =
        relay_dispatcher_at(store, silent).with_delivery_timeout(Duration::from_millis(300));

    let report = tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch(&event()))
        .await
        .expect("dispatch must give up on a silent channel");

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 1);
}
