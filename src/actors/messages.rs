//! Message types for actor communication
//!
//! 1. **Commands**: Request/response messages sent to the scheduler via mpsc
//! 2. **Events**: Broadcast notifications published to any number of subscribers

use std::time::Duration;

use tokio::sync::oneshot;

use crate::incidents::Transition;
use crate::models::{Check, MonitorId, SslInfo};

/// Event published after a monitor's check has been recorded
///
/// Subscribers that lag behind lose events; the check itself is already
/// persisted.
#[derive(Debug, Clone)]
pub struct CheckEvent {
    pub monitor_id: MonitorId,
    pub monitor_name: String,
    pub check: Check,
    pub ssl: Option<SslInfo>,
    pub transition: Transition,
}

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run an iteration now, after any iteration still in flight
    TickNow {
        respond_to: oneshot::Sender<TickReport>,
    },

    /// Wait for the running iteration, then stop
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Summary of one scheduler iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Monitors whose interval had elapsed
    pub due: usize,
    /// Due monitors skipped because of a maintenance window
    pub in_maintenance: usize,
    /// Cycles that recorded a check
    pub completed: usize,
    /// Cycles abandoned after a persistence failure
    pub abandoned: usize,
    pub elapsed: Duration,
}
