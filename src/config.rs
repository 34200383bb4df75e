use std::path::PathBuf;

use tracing::trace;

use crate::models::{MaintenanceWindow, Monitor, PushSubscription, RelayToken};
use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./uptime.db")
}

/// Values applied to monitors that leave the corresponding field unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Defaults {
    #[serde(default = "util::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "util::default_interval_sec")]
    pub interval_sec: u64,
    #[serde(default = "util::default_retries")]
    pub retries: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_ms: util::default_timeout_ms(),
            interval_sec: util::default_interval_sec(),
            retries: util::default_retries(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct SchedulerConfig {
    /// Worker pool width
    #[serde(default = "util::default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "util::default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: util::default_concurrency(),
            tick_ms: util::default_tick_ms(),
        }
    }
}

/// Application server identity used to sign web push requests
#[derive(Clone, serde::Deserialize)]
pub struct Vapid {
    /// PKCS#8 PEM encoded P-256 private key
    pub private_key_pem: String,
    /// Contact URI sent as the `sub` claim, e.g. `mailto:ops@example.com`
    pub subject: String,
}

impl std::fmt::Debug for Vapid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vapid")
            .field("private_key_pem", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

/// Delivery switches for the two push channel kinds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub push_enabled: bool,
    /// Required for web push delivery
    pub vapid: Option<Vapid>,
    #[serde(default = "default_true")]
    pub relay_enabled: bool,
    #[serde(default = "util::default_relay_url")]
    pub relay_url: String,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            push_enabled: false,
            vapid: None,
            relay_enabled: true,
            relay_url: util::default_relay_url(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Additional destination that receives every transition
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub defaults: Defaults,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Monitors upserted into storage on start-up
    #[serde(default)]
    pub monitors: Vec<Monitor>,

    #[serde(default)]
    pub maintenance: Vec<MaintenanceWindow>,

    #[serde(default)]
    pub push_subscriptions: Vec<PushSubscription>,

    #[serde(default)]
    pub relay_tokens: Vec<RelayToken>,

    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl Config {
    /// Apply environment overrides on top of the file values
    pub fn apply_env(mut self) -> Self {
        if let Some(concurrency) = util::env_parse::<usize>(util::CONCURRENCY) {
            self.scheduler.concurrency = concurrency;
        }
        if let Some(tick_ms) = util::env_parse::<u64>(util::TICK_MS) {
            self.scheduler.tick_ms = tick_ms;
        }
        if let Some(timeout_ms) = util::env_parse::<u64>(util::DEFAULT_TIMEOUT_MS) {
            self.defaults.timeout_ms = timeout_ms;
        }
        if let Some(interval_sec) = util::env_parse::<u64>(util::DEFAULT_INTERVAL_SEC) {
            self.defaults.interval_sec = interval_sec;
        }
        if let Some(retries) = util::env_parse::<u32>(util::DEFAULT_RETRIES) {
            self.defaults.retries = retries;
        }
        if let Some(push_enabled) = util::env_flag(util::PUSH_ENABLED) {
            self.channels.push_enabled = push_enabled;
        }
        if let Some(relay_enabled) = util::env_flag(util::PUSHBULLET_ENABLED) {
            self.channels.relay_enabled = relay_enabled;
        }
        if let Ok(relay_url) = std::env::var(util::PUSHBULLET_API_URL) {
            self.channels.relay_url = relay_url;
        }
        if let (Ok(private_key_pem), Ok(subject)) = (
            std::env::var(util::VAPID_PRIVATE_KEY),
            std::env::var(util::VAPID_SUBJECT),
        ) {
            self.channels.vapid = Some(Vapid {
                private_key_pem,
                subject,
            });
        }

        // a zero-width pool would never run anything
        self.scheduler.concurrency = self.scheduler.concurrency.max(1);
        self.scheduler.tick_ms = self.scheduler.tick_ms.max(1);
        self
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str::<Config>(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .map(Config::apply_env)
        .inspect(|config| trace!("loaded config: {config:?}"))
}
