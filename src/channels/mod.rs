//! Notification channel transports
//!
//! - [`WebPushChannel`]: browser push subscriptions
//! - [`PushbulletChannel`]: per-user tokens for the push relay
//! - [`DiscordChannel`] and [`WebhookChannel`]: alert hooks from the config file

use std::iter::Sum;
use std::ops::AddAssign;

use async_trait::async_trait;

use crate::alerts::NotificationEvent;
use crate::models::{PushSubscription, RelayToken};

pub mod hooks;
pub mod pushbullet;
pub mod webpush;

pub use hooks::{DiscordChannel, WebhookChannel};
pub use pushbullet::PushbulletChannel;
pub use webpush::WebPushChannel;

/// Recipients registered at dispatch time
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub push_subscriptions: Vec<PushSubscription>,
    pub relay_tokens: Vec<RelayToken>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn record(&mut self, result: &Result<(), ChannelError>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(_) => self.failed += 1,
        }
    }
}

impl AddAssign for DeliveryReport {
    fn add_assign(&mut self, rhs: Self) {
        self.delivered += rhs.delivered;
        self.failed += rhs.failed;
    }
}

impl Sum for DeliveryReport {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, report| {
            acc += report;
            acc
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to encrypt push message: {0}")]
    Encryption(#[from] web_push::WebPushError),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl ChannelError {
    /// Turn a non-success response into [`ChannelError::Rejected`]
    pub async fn check(response: reqwest::Response) -> Result<(), ChannelError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// A transport able to deliver a [`NotificationEvent`]
///
/// Implementations attempt every recipient they own and never stop at the
/// first failure.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent, targets: &Targets) -> DeliveryReport;
}
