use serde::Serialize;

use crate::alerts::{NotificationEvent, NotificationKind};

const RED: u32 = 15158332;
const GREEN: u32 = 3066993;
const ORANGE: u32 = 15105570;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Embed describing a monitor notification
pub fn build_monitor_embed(event: &NotificationEvent) -> Embed {
    let color = match event.kind {
        NotificationKind::Down { .. } | NotificationKind::SslExpired => RED,
        NotificationKind::Up { .. } => GREEN,
        NotificationKind::SslExpiringSoon { .. } => ORANGE,
    };

    let mut fields = vec![EmbedField::inline("🎯 Target", &event.target)];
    match &event.kind {
        NotificationKind::Down { error } => {
            fields.push(EmbedField::inline(
                "❗ Error",
                error.as_deref().unwrap_or("Unknown"),
            ));
        }
        NotificationKind::Up { latency_ms } => {
            fields.push(EmbedField::inline(
                "⏱️ Latency",
                latency_ms.map_or_else(|| "N/A".to_string(), |l| format!("{l}ms")),
            ));
        }
        NotificationKind::SslExpiringSoon {
            days,
            issuer,
            expiry,
        } => {
            fields.push(EmbedField::inline("📅 Expires in", format!("{days} day(s)")));
            fields.push(EmbedField::inline("🏛️ Issuer", issuer));
            fields.push(EmbedField::inline("🗓️ Expiry", expiry.format("%Y-%m-%d")));
        }
        NotificationKind::SslExpired => {}
    }

    Embed {
        title: Some(event.title()),
        description: Some(event.body()),
        color: Some(color),
        fields,
        footer: Some(EmbedFooter {
            text: format!("Monitor #{} | {}", event.monitor_id, event.monitor_name),
        }),
        timestamp: Some(event.timestamp.to_rfc3339()),
    }
}

/// Full message, mentioning `user_id` for problems
pub fn build_monitor_message(event: &NotificationEvent, user_id: Option<&str>) -> Message {
    let mut builder = MessageBuilder::new().add_embed(build_monitor_embed(event));
    if let Some(user_id) = user_id {
        if event.is_problem() {
            builder = builder.content(format!("{} <@{user_id}>", event.title()));
        }
    }
    builder.build()
}
