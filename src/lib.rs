//! Uptime monitoring engine
//!
//! Periodically probes configured targets over HTTP, TCP, DNS, a TCP based
//! reachability check, or a database query. Each observation is recorded,
//! sustained failures are turned into incidents, and incident transitions
//! and certificate expiry are announced through push, relay and hook
//! channels.

pub mod actors;
pub mod alerts;
pub mod channels;
pub mod config;
pub mod discord;
pub mod incidents;
pub mod models;
pub mod probes;
pub mod ssl;
pub mod storage;
pub mod util;
