use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::lookup_host;

use super::{Probe, ProbeError, ProbeOutcome};
use crate::models::Monitor;

/// Resolves the target host name; UP when at least one address comes back
pub struct DnsProbe;

impl DnsProbe {
    pub async fn resolve(host: &str, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        match tokio::time::timeout(timeout, lookup_host((host, 0))).await {
            Ok(Ok(mut addresses)) => match addresses.next() {
                Some(_) => ProbeOutcome::up(start.elapsed()),
                None => ProbeOutcome::down(ProbeError::NoAddress(host.to_string())),
            },
            Ok(Err(e)) => ProbeOutcome::down(ProbeError::Io(e)),
            Err(_) => ProbeOutcome::down(ProbeError::Timeout),
        }
    }
}

#[async_trait]
impl Probe for DnsProbe {
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        Self::resolve(&monitor.target, timeout).await
    }
}
