//! One monitor's pass through the pipeline
//!
//! ```text
//! probe ──► record check ──► SSL fields + alerts ──► incident evaluation ──► dispatch
//! ```
//!
//! The check is written before anything else. A failure to write it abandons
//! the cycle; the monitor stays due and is retried on a later tick.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, instrument, warn};

use super::messages::CheckEvent;
use crate::alerts::{Dispatcher, NotificationEvent};
use crate::config::Defaults;
use crate::incidents::{self, Transition};
use crate::models::Monitor;
use crate::probes::ProbeSet;
use crate::ssl::SslAlert;
use crate::storage::{MaintenanceGate, MonitorStore};

/// Collaborators shared by every cycle
pub struct CycleContext {
    pub store: Arc<dyn MonitorStore>,
    pub gate: Arc<dyn MaintenanceGate>,
    pub probes: ProbeSet,
    pub dispatcher: Dispatcher,
    pub defaults: Defaults,
    pub events: broadcast::Sender<CheckEvent>,
}

impl CycleContext {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        gate: Arc<dyn MaintenanceGate>,
        probes: ProbeSet,
        dispatcher: Dispatcher,
        defaults: Defaults,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            gate,
            probes,
            dispatcher,
            defaults,
            events,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Completed,
    Abandoned,
}

#[instrument(skip_all, fields(monitor = %monitor.name, monitor_id = monitor.id))]
pub async fn run_cycle(ctx: &CycleContext, monitor: Monitor) -> CycleResult {
    let outcome = ctx
        .probes
        .run(&monitor, monitor.timeout(&ctx.defaults))
        .await;

    let check = match ctx.store.insert_check(outcome.to_check(monitor.id)).await {
        Ok(check) => check,
        Err(e) => {
            error!("failed to record check: {e}");
            return CycleResult::Abandoned;
        }
    };

    if let Some(ssl) = &outcome.ssl {
        if let Err(e) = ctx.store.update_ssl(monitor.id, ssl).await {
            warn!("failed to update SSL info: {e}");
        }
        // the alert only depends on the freshly inspected certificate
        if let Some(alert) = SslAlert::evaluate(ssl.days_until_expiry) {
            ctx.dispatcher
                .dispatch(&NotificationEvent::ssl(&monitor, alert, ssl))
                .await;
        }
    }

    let transition =
        match incidents::evaluate(&*ctx.store, &check, monitor.retries(&ctx.defaults))
            .await
        {
            Ok(transition) => transition,
            Err(e) => {
                error!("failed to evaluate incidents: {e}");
                return CycleResult::Abandoned;
            }
        };

    match &transition {
        Transition::Opened(_) if monitor.notify_on_down => {
            ctx.dispatcher
                .dispatch(&NotificationEvent::down(&monitor, check.error.clone()))
                .await;
        }
        Transition::Opened(incident) => {
            debug!("incident {} opened without notification", incident.id);
        }
        Transition::Resolved(_) => {
            ctx.dispatcher
                .dispatch(&NotificationEvent::up(&monitor, check.latency_ms))
                .await;
        }
        Transition::Unchanged => {}
    }

    // no subscribers is fine
    let _ = ctx.events.send(CheckEvent {
        monitor_id: monitor.id,
        monitor_name: monitor.name,
        check,
        ssl: outcome.ssl,
        transition,
    });

    CycleResult::Completed
}
