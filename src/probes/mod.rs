//! Probe executors
//!
//! Each executor attempts exactly one observation of a monitor within its
//! timeout budget and reports it as a [`ProbeOutcome`]. Executors never
//! return errors: every failure is folded into a DOWN outcome carrying a
//! human-readable message.
//!
//! ```text
//! Monitor.kind ──► ProbeSet ──► HttpProbe / TcpProbe / DnsProbe / PingProbe / SqlProbe
//!                                  │
//!                                  └──► ProbeOutcome { status, latency_ms, error, ssl }
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::models::{CheckStatus, Monitor, MonitorId, NewCheck, ProbeKind, SslInfo};
use crate::ssl::SslTracker;

pub mod dns;
pub mod http;
pub mod ping;
pub mod sql;
pub mod tcp;

pub use dns::DnsProbe;
pub use http::HttpProbe;
pub use ping::PingProbe;
pub use sql::SqlProbe;
pub use tcp::TcpProbe;

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    /// Certificate metadata gathered alongside an HTTPS request
    pub ssl: Option<SslInfo>,
}

impl ProbeOutcome {
    pub fn up(latency: Duration) -> Self {
        Self {
            status: CheckStatus::Up,
            latency_ms: Some(latency.as_millis() as u64),
            error: None,
            ssl: None,
        }
    }

    pub fn down(error: impl fmt::Display) -> Self {
        Self {
            status: CheckStatus::Down,
            latency_ms: None,
            error: Some(error.to_string()),
            ssl: None,
        }
    }

    /// DOWN outcome for a target that answered, but wrongly
    pub fn down_after(latency: Duration, error: impl fmt::Display) -> Self {
        Self {
            latency_ms: Some(latency.as_millis() as u64),
            ..Self::down(error)
        }
    }

    pub fn with_ssl(mut self, ssl: Option<SslInfo>) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }

    /// The check record to append for this outcome
    pub fn to_check(&self, monitor_id: MonitorId) -> NewCheck {
        NewCheck {
            monitor_id,
            status: self.status,
            latency_ms: self.latency_ms,
            error: self.error.clone(),
        }
    }
}

/// Failures observed by the executors before they are flattened into text
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("timeout")]
    Timeout,

    #[error("Status {0}")]
    UnexpectedStatus(u16),

    #[error("Content mismatch")]
    ContentMismatch,

    #[error("invalid content pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unknown monitor type: {0}")]
    UnknownKind(String),

    #[error("{}", describe(.0))]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Request(String),

    #[error("{0}")]
    Database(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Request(describe(&err))
        }
    }
}

/// Join an error with its sources, e.g.
/// `error sending request: client error (Connect): Connection refused`
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause = cause.to_string();
        if !message.contains(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
        source = source.and_then(StdError::source);
    }
    message
}

/// Contract shared by every executor
#[async_trait]
pub trait Probe: Send + Sync {
    /// Observe `monitor` once, finishing within `timeout`
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome;
}

/// One executor per probe kind, selected by [`ProbeKind`]
pub struct ProbeSet {
    http: HttpProbe,
    tcp: TcpProbe,
    dns: DnsProbe,
    ping: PingProbe,
    sql: SqlProbe,
}

impl ProbeSet {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_ssl_tracker(SslTracker::new()?)?)
    }

    pub fn with_ssl_tracker(ssl: SslTracker) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpProbe::new(ssl)?,
            tcp: TcpProbe,
            dns: DnsProbe,
            ping: PingProbe,
            sql: SqlProbe,
        })
    }

    pub fn executor(&self, kind: &ProbeKind) -> Option<&dyn Probe> {
        match kind {
            ProbeKind::Http => Some(&self.http),
            ProbeKind::Tcp => Some(&self.tcp),
            ProbeKind::Dns => Some(&self.dns),
            ProbeKind::Ping => Some(&self.ping),
            ProbeKind::Sql => Some(&self.sql),
            ProbeKind::Unknown(_) => None,
        }
    }

    /// Run the executor matching the monitor's kind
    #[instrument(skip_all, fields(monitor = %monitor.name, kind = %monitor.kind))]
    pub async fn run(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        let outcome = match self.executor(&monitor.kind) {
            Some(executor) => executor.probe(monitor, timeout).await,
            None => ProbeOutcome::down(ProbeError::UnknownKind(monitor.kind.to_string())),
        };

        debug!(
            "probe finished: {} ({:?}ms){}",
            outcome.status,
            outcome.latency_ms,
            outcome
                .error
                .as_deref()
                .map(|e| format!(", {e}"))
                .unwrap_or_default()
        );
        outcome
    }
}
