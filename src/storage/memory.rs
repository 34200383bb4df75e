//! In-memory storage backend (no persistence)
//!
//! This backend keeps every record behind a single `RwLock`.
//! It's useful for:
//! - Testing without database dependencies
//! - Deployments that only need live alerting (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Checks are never pruned

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{MaintenanceGate, MonitorStore};
use super::error::{StorageError, StorageResult};
use crate::models::{
    Check, Incident, IncidentStatus, MaintenanceWindow, Monitor, MonitorId, NewCheck,
    PushSubscription, RelayToken, SslInfo,
};

#[derive(Debug, Default)]
struct Tables {
    monitors: BTreeMap<MonitorId, Monitor>,
    /// Checks per monitor, in insertion order
    checks: HashMap<MonitorId, Vec<Check>>,
    incidents: Vec<Incident>,
    windows: Vec<MaintenanceWindow>,
    push_subscriptions: Vec<PushSubscription>,
    relay_tokens: Vec<RelayToken>,
    next_check_id: i64,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check with an explicit timestamp
    ///
    /// Lets callers replay history (e.g. "last checked two minutes ago")
    /// without waiting for real time to pass.
    pub async fn insert_check_at(&self, check: NewCheck, created_at: DateTime<Utc>) -> Check {
        let mut tables = self.tables.write().await;
        tables.next_check_id += 1;

        let check = Check {
            id: tables.next_check_id,
            monitor_id: check.monitor_id,
            status: check.status,
            latency_ms: check.latency_ms,
            error: check.error,
            created_at,
        };

        tables
            .checks
            .entry(check.monitor_id)
            .or_default()
            .push(check.clone());
        check
    }

    /// Total number of checks recorded for a monitor
    pub async fn check_count(&self, monitor_id: MonitorId) -> usize {
        self.tables
            .read()
            .await
            .checks
            .get(&monitor_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn active_monitors(&self) -> StorageResult<Vec<Monitor>> {
        let tables = self.tables.read().await;
        Ok(tables
            .monitors
            .values()
            .filter(|m| !m.is_paused)
            .cloned()
            .collect())
    }

    async fn get_monitor(&self, monitor_id: MonitorId) -> StorageResult<Option<Monitor>> {
        Ok(self.tables.read().await.monitors.get(&monitor_id).cloned())
    }

    async fn upsert_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let ssl = tables
            .monitors
            .get(&monitor.id)
            .and_then(|existing| existing.ssl.clone());

        let mut monitor = monitor.clone();
        monitor.ssl = ssl;
        tables.monitors.insert(monitor.id, monitor);
        Ok(())
    }

    async fn latest_checks(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<Check>> {
        let tables = self.tables.read().await;
        let mut checks = tables.checks.get(&monitor_id).cloned().unwrap_or_default();

        // back-dated inserts may arrive out of order
        checks.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        checks.truncate(limit);
        Ok(checks)
    }

    async fn insert_check(&self, check: NewCheck) -> StorageResult<Check> {
        Ok(self.insert_check_at(check, Utc::now()).await)
    }

    async fn open_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>> {
        let tables = self.tables.read().await;
        Ok(tables
            .incidents
            .iter()
            .find(|i| i.monitor_id == monitor_id && i.status == IncidentStatus::Open)
            .cloned())
    }

    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let mut tables = self.tables.write().await;

        let already_open = tables
            .incidents
            .iter()
            .any(|i| i.monitor_id == monitor_id && i.status == IncidentStatus::Open);
        if already_open {
            return Err(StorageError::IncidentAlreadyOpen(monitor_id));
        }

        let incident = Incident {
            id: tables.incidents.len() as i64 + 1,
            monitor_id,
            started_at,
            ended_at: None,
            status: IncidentStatus::Open,
        };
        tables.incidents.push(incident.clone());

        debug!("opened incident {} for monitor {monitor_id}", incident.id);
        Ok(incident)
    }

    async fn resolve_incident(
        &self,
        incident_id: i64,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<Incident> {
        let mut tables = self.tables.write().await;
        let incident = tables
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or_else(|| StorageError::QueryFailed(format!("incident {incident_id} not found")))?;

        incident.ended_at = Some(ended_at);
        incident.status = IncidentStatus::Resolved;
        Ok(incident.clone())
    }

    async fn incidents(&self, monitor_id: MonitorId) -> StorageResult<Vec<Incident>> {
        let tables = self.tables.read().await;
        Ok(tables
            .incidents
            .iter()
            .filter(|i| i.monitor_id == monitor_id)
            .cloned()
            .collect())
    }

    async fn update_ssl(&self, monitor_id: MonitorId, ssl: &SslInfo) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let monitor = tables
            .monitors
            .get_mut(&monitor_id)
            .ok_or(StorageError::MonitorNotFound(monitor_id))?;
        monitor.ssl = Some(ssl.clone());
        Ok(())
    }

    async fn push_subscriptions(&self) -> StorageResult<Vec<PushSubscription>> {
        Ok(self.tables.read().await.push_subscriptions.clone())
    }

    async fn relay_tokens(&self) -> StorageResult<Vec<RelayToken>> {
        Ok(self.tables.read().await.relay_tokens.clone())
    }

    async fn save_push_subscription(
        &self,
        subscription: &PushSubscription,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .push_subscriptions
            .retain(|s| s.endpoint != subscription.endpoint);
        tables.push_subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn save_relay_token(&self, token: &RelayToken) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.relay_tokens.retain(|t| t.token != token.token);
        tables.relay_tokens.push(token.clone());
        Ok(())
    }

    async fn save_maintenance_window(&self, window: &MaintenanceWindow) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.windows.retain(|w| w.name != window.name);
        tables.windows.push(window.clone());
        Ok(())
    }
}

#[async_trait]
impl MaintenanceGate for MemoryStore {
    async fn is_in_maintenance(
        &self,
        monitor_id: MonitorId,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.windows.iter().any(|w| w.covers(monitor_id, now)))
    }
}
