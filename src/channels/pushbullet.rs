use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use super::{ChannelError, DeliveryReport, NotificationChannel, Targets};
use crate::alerts::NotificationEvent;
use crate::models::RelayToken;

/// Delivery through the Pushbullet relay, one note per registered token
pub struct PushbulletChannel {
    client: reqwest::Client,
    api_url: String,
    enabled: bool,
}

impl PushbulletChannel {
    pub fn new(client: reqwest::Client, api_url: String, enabled: bool) -> Self {
        Self {
            client,
            api_url,
            enabled,
        }
    }

    async fn send(&self, token: &RelayToken, title: &str, body: &str) -> Result<(), ChannelError> {
        let payload = json!({
            "type": "note",
            "title": title,
            "body": body,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Access-Token", &token.token)
            .json(&payload)
            .send()
            .await?;
        ChannelError::check(response).await
    }
}

#[async_trait]
impl NotificationChannel for PushbulletChannel {
    fn name(&self) -> &str {
        "pushbullet"
    }

    #[instrument(skip_all, fields(tokens = targets.relay_tokens.len()))]
    async fn deliver(&self, event: &NotificationEvent, targets: &Targets) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if !self.enabled {
            debug!("pushbullet disabled, skipping");
            return report;
        }
        if targets.relay_tokens.is_empty() {
            debug!("no relay tokens registered");
            return report;
        }

        let title = event.title();
        let body = event.body();
        for token in &targets.relay_tokens {
            let result = self.send(token, &title, &body).await;
            match &result {
                Ok(()) => info!("sent to {}", token.owner),
                Err(e) => error!(
                    "failed for {} (token {}): {e}",
                    token.owner,
                    token.redacted()
                ),
            }
            report.record(&result);
        }
        report
    }
}
