//! SchedulerActor - drives monitors through the check pipeline
//!
//! ## Key Features
//!
//! 1. **Single iteration in flight** - the actor owns at most one running
//!    iteration; timer ticks that arrive while it runs are dropped
//! 2. **Due selection** - a monitor is due once `interval` has passed since
//!    its latest check, or immediately if it was never checked
//! 3. **Bounded pool** - cycles run concurrently, at most `concurrency` at a
//!    time, admitted in submission order
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → select due → maintenance gate → pool → run_cycle → CheckEvent
//!     ↑
//!     └─── Commands (TickNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use super::cycle::{CycleContext, CycleResult, run_cycle};
use super::messages::{CheckEvent, SchedulerCommand, TickReport};
use crate::config::SchedulerConfig;
use crate::models::{Check, Monitor};

/// Whether a monitor last checked by `last` is due at `now`
pub fn is_due(last: Option<&Check>, interval: Duration, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return true;
    };
    // an interval too large for chrono never elapses
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| last.created_at.checked_add_signed(interval))
        .is_some_and(|next_run| now >= next_run)
}

pub struct SchedulerActor {
    context: Arc<CycleContext>,

    /// Shared worker pool; fair, so waiting cycles are admitted in order
    pool: Arc<Semaphore>,

    tick: Duration,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// The iteration started by the last timer tick
    in_flight: Option<JoinHandle<TickReport>>,
}

impl SchedulerActor {
    pub fn new(
        context: Arc<CycleContext>,
        config: SchedulerConfig,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            context,
            pool: Arc::new(Semaphore::new(config.concurrency.max(1))),
            tick: Duration::from_millis(config.tick_ms.max(1)),
            command_rx,
            in_flight: None,
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(tick_ms = self.tick.as_millis() as u64))]
    pub async fn run(mut self) {
        info!(
            "starting scheduler with {} workers",
            self.pool.available_permits()
        );

        let mut ticker = interval_at(tokio::time::Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap_finished().await;
                    if self.in_flight.is_some() {
                        trace!("previous iteration still running, skipping tick");
                        continue;
                    }
                    let context = self.context.clone();
                    let pool = self.pool.clone();
                    self.in_flight = Some(tokio::spawn(run_iteration(context, pool)));
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            self.wait_in_flight().await;
                            let report = run_iteration(self.context.clone(), self.pool.clone()).await;
                            let _ = respond_to.send(report);
                        }

                        SchedulerCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            self.wait_in_flight().await;
                            let _ = respond_to.send(());
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    self.wait_in_flight().await;
                    break;
                }
            }
        }

        info!("scheduler stopped");
    }

    async fn reap_finished(&mut self) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
        {
            self.wait_in_flight().await;
        }
    }

    async fn wait_in_flight(&mut self) {
        let Some(handle) = self.in_flight.take() else {
            return;
        };
        match handle.await {
            Ok(report) => log_report(&report),
            Err(e) => error!("scheduler iteration failed: {e}"),
        }
    }
}

fn log_report(report: &TickReport) {
    if report.due == 0 {
        trace!("nothing due");
        return;
    }
    debug!(
        "iteration done in {:?}: {} due, {} in maintenance, {} completed, {} abandoned",
        report.elapsed, report.due, report.in_maintenance, report.completed, report.abandoned
    );
}

/// Monitors to probe this iteration, in the order they are submitted
async fn select_due(context: &CycleContext, report: &mut TickReport) -> Vec<Monitor> {
    let monitors = match context.store.active_monitors().await {
        Ok(monitors) => monitors,
        Err(e) => {
            error!("failed to load monitors: {e}");
            return Vec::new();
        }
    };

    let now = Utc::now();
    let mut due = Vec::new();

    for monitor in monitors {
        if monitor.is_paused {
            continue;
        }

        let last = match context.store.latest_checks(monitor.id, 1).await {
            Ok(mut checks) => checks.pop(),
            Err(e) => {
                warn!("failed to load last check of {}: {e}", monitor.name);
                continue;
            }
        };
        if !is_due(last.as_ref(), monitor.interval(&context.defaults), now) {
            continue;
        }
        report.due += 1;

        match context.gate.is_in_maintenance(monitor.id, now).await {
            Ok(true) => {
                debug!("{} is in maintenance, skipping", monitor.name);
                report.in_maintenance += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => warn!("maintenance lookup for {} failed, probing anyway: {e}", monitor.name),
        }

        due.push(monitor);
    }

    due
}

/// One full scheduler iteration
pub async fn run_iteration(context: Arc<CycleContext>, pool: Arc<Semaphore>) -> TickReport {
    let start = Instant::now();
    let mut report = TickReport::default();

    let due = select_due(&context, &mut report).await;
    let mut cycles = JoinSet::new();

    for monitor in due {
        let Ok(permit) = pool.clone().acquire_owned().await else {
            error!("worker pool closed");
            break;
        };
        let context = context.clone();
        cycles.spawn(async move {
            let result = run_cycle(&context, monitor).await;
            drop(permit);
            result
        });
    }

    while let Some(joined) = cycles.join_next().await {
        match joined {
            Ok(CycleResult::Completed) => report.completed += 1,
            Ok(CycleResult::Abandoned) => report.abandoned += 1,
            Err(e) => {
                error!("monitor cycle failed: {e}");
                report.abandoned += 1;
            }
        }
    }

    report.elapsed = start.elapsed();
    report
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    events: broadcast::Sender<CheckEvent>,
}

impl SchedulerHandle {
    /// Spawn a new scheduler actor
    pub fn spawn(context: CycleContext, config: SchedulerConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let events = context.events.clone();

        let actor = SchedulerActor::new(Arc::new(context), config, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            events,
        }
    }

    /// Run an iteration immediately and wait for its report
    pub async fn tick_now(&self) -> anyhow::Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await
            .context("scheduler is not running")?;

        rx.await.context("scheduler dropped the request")
    }

    /// Receive a [`CheckEvent`] for every recorded check
    pub fn subscribe(&self) -> broadcast::Receiver<CheckEvent> {
        self.events.subscribe()
    }

    /// Stop the scheduler once the running iteration has finished
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
