use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::instrument;

use super::{Probe, ProbeError, ProbeOutcome};
use crate::models::Monitor;

/// Port used when a `tcp` monitor has none configured
pub const DEFAULT_TCP_PORT: u16 = 80;

/// Raw TCP connect probe; latency is the time to connect
pub struct TcpProbe;

impl TcpProbe {
    /// Connect to `host:port`, using `timeout` as the connect deadline
    #[instrument(level = "debug")]
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => ProbeOutcome::up(start.elapsed()),
            Ok(Err(e)) => ProbeOutcome::down(ProbeError::Io(e)),
            Err(_) => ProbeOutcome::down(ProbeError::Timeout),
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        let port = monitor.port.unwrap_or(DEFAULT_TCP_PORT);
        Self::connect(&monitor.target, port, timeout).await
    }
}
