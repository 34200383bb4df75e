//! Domain records shared by the probes, the incident state machine and the
//! storage backends.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Defaults;

pub type MonitorId = i64;

/// Protocol used to observe a monitor
///
/// Parsed once when the monitor is loaded (from the config file or from a
/// storage row). Unrecognised kinds are kept so the probe can report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProbeKind {
    Http,
    Tcp,
    Dns,
    Ping,
    Sql,
    Unknown(String),
}

impl From<String> for ProbeKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "http" | "https" => ProbeKind::Http,
            "tcp" => ProbeKind::Tcp,
            "dns" => ProbeKind::Dns,
            "ping" => ProbeKind::Ping,
            // legacy configs name the engine instead of the kind
            "sql" | "mssql" => ProbeKind::Sql,
            _ => ProbeKind::Unknown(value),
        }
    }
}

impl From<ProbeKind> for String {
    fn from(value: ProbeKind) -> Self {
        value.to_string()
    }
}

impl FromStr for ProbeKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProbeKind::from(s.to_string()))
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Http => write!(f, "http"),
            ProbeKind::Tcp => write!(f, "tcp"),
            ProbeKind::Dns => write!(f, "dns"),
            ProbeKind::Ping => write!(f, "ping"),
            ProbeKind::Sql => write!(f, "sql"),
            ProbeKind::Unknown(kind) => write!(f, "{kind}"),
        }
    }
}

/// Database engine targeted by a `sql` monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlEngine {
    Postgres,
    Mysql,
    #[default]
    Mssql,
}

impl SqlEngine {
    pub fn default_port(&self) -> u16 {
        match self {
            SqlEngine::Postgres => 5432,
            SqlEngine::Mysql => 3306,
            SqlEngine::Mssql => 1433,
        }
    }

    pub fn url_scheme(&self) -> &'static str {
        match self {
            SqlEngine::Postgres => "postgres",
            SqlEngine::Mysql => "mysql",
            SqlEngine::Mssql => "mssql",
        }
    }
}

/// Connection parameters of a `sql` monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlSettings {
    #[serde(default)]
    pub engine: SqlEngine,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Custom health query; `SELECT 1` when unset
    pub query: Option<String>,
}

/// Certificate metadata collected by the SSL tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SslInfo {
    pub cert_expiry: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub issuer: String,
    pub valid: bool,
}

/// A configured target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,
    pub kind: ProbeKind,

    /// URL for `http`, host name or address for every other kind
    pub target: String,
    pub port: Option<u16>,

    pub interval_sec: Option<u64>,
    pub retries: Option<u32>,
    pub timeout_ms: Option<u64>,

    pub expected_status: Option<u16>,
    pub content_pattern: Option<String>,
    pub sql: Option<SqlSettings>,

    #[serde(default)]
    pub notify_on_down: bool,
    #[serde(default)]
    pub is_paused: bool,

    /// Written only by the SSL tracker
    #[serde(default, skip_deserializing)]
    pub ssl: Option<SslInfo>,
}

impl Monitor {
    pub fn interval(&self, defaults: &Defaults) -> Duration {
        Duration::from_secs(self.interval_sec.unwrap_or(defaults.interval_sec))
    }

    pub fn timeout(&self, defaults: &Defaults) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(defaults.timeout_ms))
    }

    /// Consecutive-failure threshold. `Some(0)` is kept as is.
    pub fn retries(&self, defaults: &Defaults) -> u32 {
        self.retries.unwrap_or(defaults.retries)
    }

    pub fn is_https(&self) -> bool {
        self.kind == ProbeKind::Http
            && url::Url::parse(&self.target).is_ok_and(|url| url.scheme() == "https")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "UP"),
            CheckStatus::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(CheckStatus::Up),
            "DOWN" => Ok(CheckStatus::Down),
            other => Err(format!("invalid check status: {other}")),
        }
    }
}

/// Observation about to be recorded; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheck {
    pub monitor_id: MonitorId,
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// One immutable observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: i64,
    pub monitor_id: MonitorId,
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncidentStatus::Open => write!(f, "OPEN"),
            IncidentStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(IncidentStatus::Open),
            "RESOLVED" => Ok(IncidentStatus::Resolved),
            other => Err(format!("invalid incident status: {other}")),
        }
    }
}

/// A contiguous outage span of one monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub monitor_id: MonitorId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: IncidentStatus,
}

/// Browser push subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Per-user token for the third-party push relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayToken {
    /// Owner label, used only in log lines
    pub owner: String,
    pub token: String,
}

impl RelayToken {
    /// Token prefix safe to print
    pub fn redacted(&self) -> String {
        let prefix: String = self.token.chars().take(6).collect();
        format!("{prefix}…")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub monitor_ids: Vec<MonitorId>,
}

impl MaintenanceWindow {
    /// Both bounds are inclusive
    pub fn covers(&self, monitor_id: MonitorId, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end && self.monitor_ids.contains(&monitor_id)
    }
}
