//! Incident state machine
//!
//! ```text
//!   NONE ──(fails >= retries)──► OPEN ──(UP check)──► RESOLVED
//!    ▲                                                   │
//!    └───────────────────────────────────────────────────┘
//! ```
//!
//! Evaluated once per recorded check. The threshold comparison is taken
//! literally: with `retries = 0` the window of recent checks is empty, so the
//! first evaluation without an open incident opens one.
//!
//! A consequence is that a healthy monitor with `retries = 0` flaps: every UP
//! check alternately opens an incident and resolves it, and each resolution
//! dispatches an "up" notification. Configure `retries >= 1` for a monitor
//! that should stay quiet while healthy.

use tracing::{debug, instrument, warn};

use crate::models::{Check, CheckStatus, Incident};
use crate::storage::{MonitorStore, StorageError, StorageResult};

/// What an evaluation did to the monitor's incidents
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened(Incident),
    Resolved(Incident),
    Unchanged,
}

/// Apply `check` (already persisted) to the incident state of its monitor
#[instrument(skip(store, check), fields(monitor_id = check.monitor_id, status = %check.status))]
pub async fn evaluate(
    store: &dyn MonitorStore,
    check: &Check,
    retries: u32,
) -> StorageResult<Transition> {
    let recent = store
        .latest_checks(check.monitor_id, retries as usize)
        .await?;
    let fails = recent
        .iter()
        .filter(|c| c.status != CheckStatus::Up)
        .count() as u64;

    let open = store.open_incident(check.monitor_id).await?;
    debug!(
        "{fails}/{retries} recent checks failed, open incident: {}",
        open.is_some()
    );

    match open {
        None if fails >= u64::from(retries) => {
            match store
                .create_incident(check.monitor_id, check.created_at)
                .await
            {
                Ok(incident) => Ok(Transition::Opened(incident)),
                Err(StorageError::IncidentAlreadyOpen(id)) => {
                    warn!("incident for monitor {id} was opened concurrently");
                    Ok(Transition::Unchanged)
                }
                Err(e) => Err(e),
            }
        }
        Some(incident) if check.status == CheckStatus::Up => {
            let resolved = store
                .resolve_incident(incident.id, check.created_at)
                .await?;
            Ok(Transition::Resolved(resolved))
        }
        _ => Ok(Transition::Unchanged),
    }
}
