//! Notification dispatcher
//!
//! Turns incident transitions and certificate alerts into a
//! [`NotificationEvent`] and fans it out to every configured channel. Each
//! channel delivers to each of its recipients independently; failures are
//! logged and counted, never propagated to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, info, instrument, warn};

use crate::channels::{
    DeliveryReport, DiscordChannel, NotificationChannel, PushbulletChannel, Targets,
    WebPushChannel, WebhookChannel,
};
use crate::config::{Alert, ChannelsConfig};
use crate::models::{Monitor, MonitorId, SslInfo};
use crate::ssl::SslAlert;
use crate::storage::MonitorStore;

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    Down { error: Option<String> },
    Up { latency_ms: Option<u64> },
    SslExpiringSoon { days: i64, issuer: String, expiry: DateTime<Utc> },
    SslExpired,
}

/// A single message to fan out
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub target: String,
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    fn new(monitor: &Monitor, kind: NotificationKind) -> Self {
        Self {
            monitor_id: monitor.id,
            monitor_name: monitor.name.clone(),
            target: monitor.target.clone(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn down(monitor: &Monitor, error: Option<String>) -> Self {
        Self::new(monitor, NotificationKind::Down { error })
    }

    pub fn up(monitor: &Monitor, latency_ms: Option<u64>) -> Self {
        Self::new(monitor, NotificationKind::Up { latency_ms })
    }

    pub fn ssl(monitor: &Monitor, alert: SslAlert, info: &SslInfo) -> Self {
        let kind = match alert {
            SslAlert::ExpiringSoon { days } => NotificationKind::SslExpiringSoon {
                days,
                issuer: info.issuer.clone(),
                expiry: info.cert_expiry,
            },
            SslAlert::Expired => NotificationKind::SslExpired,
        };
        Self::new(monitor, kind)
    }

    pub fn is_problem(&self) -> bool {
        !matches!(self.kind, NotificationKind::Up { .. })
    }

    pub fn title(&self) -> String {
        let name = &self.monitor_name;
        match &self.kind {
            NotificationKind::Down { .. } => format!("🔴 {name} is DOWN"),
            NotificationKind::Up { .. } => format!("✅ {name} is UP"),
            NotificationKind::SslExpiringSoon { .. } => {
                format!("⚠️ SSL Certificate Expiring Soon: {name}")
            }
            NotificationKind::SslExpired => format!("❌ SSL Certificate EXPIRED: {name}"),
        }
    }

    pub fn body(&self) -> String {
        let name = &self.monitor_name;
        let target = &self.target;
        match &self.kind {
            NotificationKind::Down { error } => format!(
                "Monitor \"{name}\" ({target}) is currently DOWN. Error: {}",
                error.as_deref().unwrap_or("Unknown")
            ),
            NotificationKind::Up { latency_ms } => format!(
                "Monitor \"{name}\" ({target}) has recovered and is now UP. Latency: {}ms",
                latency_ms.map_or_else(|| "N/A".to_string(), |l| l.to_string())
            ),
            NotificationKind::SslExpiringSoon {
                days,
                issuer,
                expiry,
            } => format!(
                "The SSL certificate for \"{name}\" ({target}) will expire in {days} day(s). \
                 Issuer: {issuer}. Expiry: {}",
                expiry.format("%Y-%m-%d")
            ),
            NotificationKind::SslExpired => format!(
                "The SSL certificate for \"{name}\" ({target}) has EXPIRED. Immediate action required!"
            ),
        }
    }
}

/// Upper bound for one channel's delivery of one event
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Dispatcher {
    store: Arc<dyn MonitorStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    delivery_timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher without channels
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self {
            store,
            channels: Vec::new(),
            delivery_timeout: DELIVERY_TIMEOUT,
        }
    }

    /// Push and relay channels plus one hook channel per configured alert
    pub fn from_config(
        store: Arc<dyn MonitorStore>,
        channels: &ChannelsConfig,
        alerts: &[Alert],
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        let mut dispatcher = Self::new(store)
            .with_channel(Arc::new(WebPushChannel::new(
                client.clone(),
                channels.push_enabled,
                channels.vapid.clone(),
            )))
            .with_channel(Arc::new(PushbulletChannel::new(
                client.clone(),
                channels.relay_url.clone(),
                channels.relay_enabled,
            )));

        for alert in alerts {
            dispatcher = match alert {
                Alert::Discord(discord) => dispatcher.with_channel(Arc::new(DiscordChannel::new(
                    client.clone(),
                    discord.clone(),
                ))),
                Alert::Webhook(webhook) => dispatcher.with_channel(Arc::new(
                    WebhookChannel::new(client.clone(), webhook.clone()),
                )),
            };
        }

        Ok(dispatcher)
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// A channel still busy after `timeout` is abandoned and counted as failed
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Deliver `event` through every channel
    ///
    /// Recipients are read from the store at dispatch time. A store failure
    /// only empties the recipient lists; hook channels still fire.
    #[instrument(skip_all, fields(monitor = %event.monitor_name, title = %event.title()))]
    pub async fn dispatch(&self, event: &NotificationEvent) -> DeliveryReport {
        let targets = self.load_targets().await;

        let reports = join_all(
            self.channels
                .iter()
                .map(|channel| self.deliver(channel.as_ref(), event, &targets)),
        )
        .await;

        let report: DeliveryReport = reports.into_iter().sum();
        info!(
            "notification dispatched: {} delivered, {} failed",
            report.delivered, report.failed
        );
        report
    }

    async fn deliver(
        &self,
        channel: &dyn NotificationChannel,
        event: &NotificationEvent,
        targets: &Targets,
    ) -> DeliveryReport {
        match tokio::time::timeout(self.delivery_timeout, channel.deliver(event, targets)).await {
            Ok(report) => report,
            Err(_) => {
                warn!(
                    "{} delivery abandoned after {:?}",
                    channel.name(),
                    self.delivery_timeout
                );
                DeliveryReport {
                    delivered: 0,
                    failed: 1,
                }
            }
        }
    }

    async fn load_targets(&self) -> Targets {
        let push_subscriptions = self
            .store
            .push_subscriptions()
            .await
            .inspect_err(|e| error!("failed to load push subscriptions: {e}"))
            .unwrap_or_default();
        let relay_tokens = self
            .store
            .relay_tokens()
            .await
            .inspect_err(|e| error!("failed to load relay tokens: {e}"))
            .unwrap_or_default();

        Targets {
            push_subscriptions,
            relay_tokens,
        }
    }
}
