use std::str::FromStr;

pub const CONCURRENCY: &str = "CONCURRENCY";
pub const TICK_MS: &str = "TICK_MS";
pub const DEFAULT_TIMEOUT_MS: &str = "DEFAULT_TIMEOUT_MS";
pub const DEFAULT_INTERVAL_SEC: &str = "DEFAULT_INTERVAL_SEC";
pub const DEFAULT_RETRIES: &str = "DEFAULT_RETRIES";
pub const PUSH_ENABLED: &str = "PUSH_ENABLED";
pub const PUSHBULLET_ENABLED: &str = "PUSHBULLET_ENABLED";
pub const PUSHBULLET_API_URL: &str = "PUSHBULLET_API_URL";
pub const VAPID_PRIVATE_KEY: &str = "VAPID_PRIVATE_KEY";
pub const VAPID_SUBJECT: &str = "VAPID_SUBJECT";

const DEFAULT_CONCURRENCY: usize = 10;

pub fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

pub fn default_tick_ms() -> u64 {
    1000
}

pub fn default_timeout_ms() -> u64 {
    5000
}

pub fn default_interval_sec() -> u64 {
    60
}

pub fn default_retries() -> u32 {
    1
}

pub fn default_relay_url() -> String {
    String::from("https://api.pushbullet.com/v2/pushes")
}

/// Parse an environment variable, ignoring it when unset or malformed
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

/// `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitive
pub fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    parse_flag(&value)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
