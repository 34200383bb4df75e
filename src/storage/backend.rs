//! Collaborator traits consumed by the scheduler
//!
//! The scheduling core never owns its records; it reads and appends through
//! these traits so that the same pipeline runs against the in-memory store in
//! tests and against SQLite in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::models::{
    Check, Incident, MaintenanceWindow, Monitor, MonitorId, NewCheck, PushSubscription, RelayToken,
    SslInfo,
};

/// Trait for persistent storage backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared by every
/// worker in the probe pool.
///
/// ## Consistency
///
/// Only one cycle ever runs per monitor at a time, so implementations do not
/// need cross-call transactions. They must however refuse to create a second
/// OPEN incident for the same monitor.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Non-paused monitors, ordered by id
    async fn active_monitors(&self) -> StorageResult<Vec<Monitor>>;

    async fn get_monitor(&self, monitor_id: MonitorId) -> StorageResult<Option<Monitor>>;

    /// Insert or replace a monitor definition, keeping its SSL fields
    async fn upsert_monitor(&self, monitor: &Monitor) -> StorageResult<()>;

    /// The `limit` most recent checks, newest first
    async fn latest_checks(&self, monitor_id: MonitorId, limit: usize)
    -> StorageResult<Vec<Check>>;

    /// Append a check; the store assigns `id` and `created_at`
    async fn insert_check(&self, check: NewCheck) -> StorageResult<Check>;

    async fn open_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>>;

    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
    ) -> StorageResult<Incident>;

    async fn resolve_incident(
        &self,
        incident_id: i64,
        ended_at: DateTime<Utc>,
    ) -> StorageResult<Incident>;

    /// Every incident of a monitor, oldest first
    async fn incidents(&self, monitor_id: MonitorId) -> StorageResult<Vec<Incident>>;

    async fn update_ssl(&self, monitor_id: MonitorId, ssl: &SslInfo) -> StorageResult<()>;

    async fn push_subscriptions(&self) -> StorageResult<Vec<PushSubscription>>;

    async fn relay_tokens(&self) -> StorageResult<Vec<RelayToken>>;

    /// Insert a subscription; an existing endpoint is replaced
    async fn save_push_subscription(&self, subscription: &PushSubscription)
    -> StorageResult<()>;

    /// Insert a relay token; an existing token is replaced
    async fn save_relay_token(&self, token: &RelayToken) -> StorageResult<()>;

    async fn save_maintenance_window(&self, window: &MaintenanceWindow) -> StorageResult<()>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Maintenance predicate queried before a due monitor is probed
#[async_trait]
pub trait MaintenanceGate: Send + Sync {
    async fn is_in_maintenance(
        &self,
        monitor_id: MonitorId,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;
}
