//! Reachability probe for `ping` monitors
//!
//! Sending ICMP echo requests needs raw sockets, which an unprivileged
//! process does not get. This probe approximates reachability with a TCP
//! connect to port 443 of the target instead. A host that answers ICMP but
//! has nothing listening on 443 is therefore reported DOWN.

use std::time::Duration;

use async_trait::async_trait;

use super::{Probe, ProbeOutcome, TcpProbe};
use crate::models::Monitor;

pub const PING_PORT: u16 = 443;

pub struct PingProbe;

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        TcpProbe::connect(&monitor.target, PING_PORT, timeout).await
    }
}
