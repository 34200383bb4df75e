use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, instrument};
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushError, WebPushMessage,
    WebPushMessageBuilder,
};

use super::{ChannelError, DeliveryReport, NotificationChannel, Targets};
use crate::alerts::NotificationEvent;
use crate::config::Vapid;
use crate::models::PushSubscription;

/// Seconds a push service may hold an undelivered message
const PUSH_TTL_SECS: u32 = 24 * 60 * 60;

/// Browser push delivery
///
/// Each payload is encrypted for the subscription's keys (`aes128gcm`) and
/// signed with the configured VAPID key before it is posted to the push
/// service endpoint.
pub struct WebPushChannel {
    client: reqwest::Client,
    enabled: bool,
    vapid: Option<Vapid>,
}

impl WebPushChannel {
    pub fn new(client: reqwest::Client, enabled: bool, vapid: Option<Vapid>) -> Self {
        Self {
            client,
            enabled,
            vapid,
        }
    }

    async fn send(
        &self,
        vapid: &Vapid,
        subscription: &PushSubscription,
        event: &NotificationEvent,
    ) -> Result<(), ChannelError> {
        let payload = json!({
            "title": event.title(),
            "body": event.body(),
            "monitorId": event.monitor_id,
            "timestamp": event.timestamp.to_rfc3339(),
        });
        let message = encrypt(vapid, subscription, payload.to_string().as_bytes())?;

        let mut request = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", message.ttl.to_string());

        if let Some(payload) = message.payload {
            request = request
                .header("Content-Encoding", payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");
            for (name, value) in payload.crypto_headers {
                request = request.header(name, value);
            }
            request = request.body(payload.content);
        }

        let response = request.send().await?;
        ChannelError::check(response).await
    }
}

/// Encrypt `content` for `subscription` and attach the VAPID signature
fn encrypt(
    vapid: &Vapid,
    subscription: &PushSubscription,
    content: &[u8],
) -> Result<WebPushMessage, WebPushError> {
    let info = SubscriptionInfo::new(
        subscription.endpoint.as_str(),
        subscription.p256dh.as_str(),
        subscription.auth.as_str(),
    );

    let mut signature = VapidSignatureBuilder::from_pem(vapid.private_key_pem.as_bytes(), &info)?;
    signature.add_claim("sub", vapid.subject.as_str());

    let mut builder = WebPushMessageBuilder::new(&info);
    builder.set_ttl(PUSH_TTL_SECS);
    builder.set_payload(ContentEncoding::Aes128Gcm, content);
    builder.set_vapid_signature(signature.build()?);
    builder.build()
}

#[async_trait]
impl NotificationChannel for WebPushChannel {
    fn name(&self) -> &str {
        "webpush"
    }

    #[instrument(skip_all, fields(subscriptions = targets.push_subscriptions.len()))]
    async fn deliver(&self, event: &NotificationEvent, targets: &Targets) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if !self.enabled {
            debug!("web push disabled, skipping");
            return report;
        }
        let Some(vapid) = &self.vapid else {
            error!("web push enabled but no VAPID key configured");
            return report;
        };

        for subscription in &targets.push_subscriptions {
            let result = self.send(vapid, subscription, event).await;
            if let Err(e) = &result {
                error!("web push to {} failed: {e}", subscription.endpoint);
            }
            report.record(&result);
        }
        report
    }
}
