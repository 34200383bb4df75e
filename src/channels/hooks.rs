//! Alert hooks configured in the `alerts` section of the config file

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, instrument};

use super::{ChannelError, DeliveryReport, NotificationChannel, Targets};
use crate::alerts::NotificationEvent;
use crate::config::{Discord, Webhook};
use crate::discord::build_monitor_message;

pub struct DiscordChannel {
    client: reqwest::Client,
    discord: Discord,
}

impl DiscordChannel {
    pub fn new(client: reqwest::Client, discord: Discord) -> Self {
        Self { client, discord }
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let message = build_monitor_message(event, self.discord.user_id.as_deref());
        let response = self
            .client
            .post(&self.discord.url)
            .json(&message)
            .send()
            .await?;
        ChannelError::check(response).await
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip_all)]
    async fn deliver(&self, event: &NotificationEvent, _targets: &Targets) -> DeliveryReport {
        let result = self.send(event).await;
        match &result {
            Ok(()) => info!("Successfully sent Discord message"),
            Err(e) => error!("Failed to send Discord message: {e}"),
        }

        let mut report = DeliveryReport::default();
        report.record(&result);
        report
    }
}

/// Generic JSON webhook
pub struct WebhookChannel {
    client: reqwest::Client,
    webhook: Webhook,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, webhook: Webhook) -> Self {
        Self { client, webhook }
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let payload = json!({
            "title": event.title(),
            "message": event.body(),
            "monitor_id": event.monitor_id,
            "monitor": event.monitor_name,
            "target": event.target,
            "problem": event.is_problem(),
            "timestamp": event.timestamp.to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.webhook.url)
            .json(&payload)
            .send()
            .await?;
        ChannelError::check(response).await
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all)]
    async fn deliver(&self, event: &NotificationEvent, _targets: &Targets) -> DeliveryReport {
        let result = self.send(event).await;
        match &result {
            Ok(()) => info!("Successfully sent webhook alert"),
            Err(e) => error!("Failed to send webhook alert: {e}"),
        }

        let mut report = DeliveryReport::default();
        report.record(&result);
        report
    }
}
