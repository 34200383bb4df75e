//! HTTP(S) probe
//!
//! Issues a GET with a hard deadline and validates the optional status and
//! content assertions. For `https` targets the certificate is inspected on a
//! separate connection while the request is in flight; its metadata is
//! attached to the outcome whatever the request's fate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tracing::{instrument, trace};

use super::{Probe, ProbeError, ProbeOutcome};
use crate::models::{Monitor, SslInfo};
use crate::ssl::SslTracker;

pub struct HttpProbe {
    /// HTTP client (reused across requests)
    client: reqwest::Client,
    ssl: SslTracker,
}

impl HttpProbe {
    pub fn new(ssl: SslTracker) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("uptime-watch/", env!("CARGO_PKG_VERSION")))
            // the expected status applies to the first response
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, ssl })
    }

    async fn request(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        trace!("requesting {}", monitor.target);
        let start = Instant::now();

        let response = match self
            .client
            .get(&monitor.target)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::down(ProbeError::from(e)),
        };

        let latency = start.elapsed();
        let status = response.status().as_u16();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ProbeOutcome::down(ProbeError::from(e)),
        };

        match evaluate_response(monitor, status, &body) {
            Ok(()) => ProbeOutcome::up(latency),
            Err(e) => ProbeOutcome::down_after(latency, e),
        }
    }

    /// Bounded by the probe timeout as well as the tracker's own deadline
    async fn certificate(&self, monitor: &Monitor, timeout: Duration) -> Option<SslInfo> {
        if !monitor.is_https() {
            return None;
        }
        tokio::time::timeout(timeout, self.ssl.inspect_url(&monitor.target))
            .await
            .ok()
            .flatten()
    }
}

/// Status first, then content
fn evaluate_response(monitor: &Monitor, status: u16, body: &str) -> Result<(), ProbeError> {
    if let Some(expected) = monitor.expected_status {
        if status != expected {
            return Err(ProbeError::UnexpectedStatus(status));
        }
    }

    if let Some(pattern) = &monitor.content_pattern {
        if !Regex::new(pattern)?.is_match(body) {
            return Err(ProbeError::ContentMismatch);
        }
    }

    Ok(())
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip_all, fields(url = %monitor.target))]
    async fn probe(&self, monitor: &Monitor, timeout: Duration) -> ProbeOutcome {
        let (outcome, ssl) = tokio::join!(
            self.request(monitor, timeout),
            self.certificate(monitor, timeout)
        );
        outcome.with_ssl(ssl)
    }
}
