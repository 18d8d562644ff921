//! PollScheduler - Runs collection cycles over the whole fleet
//!
//! The scheduler is the single writer of the [`SnapshotStore`] and the only
//! owner of the [`AlertStateTracker`]. Each cycle:
//!
//! 1. lists the targets from the registry
//! 2. collects every target concurrently, each call bounded by a timeout and
//!    guarded against panics
//! 3. replaces the cache and persists it
//! 4. classifies every status and lets the tracker decide what to notify
//! 5. hands the due alerts to the dispatcher in one batch
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─┐
//!             ├─► run_cycle() ─► CycleReport
//! PollNow ────┘
//!     ↑
//!     └─── Commands (PollNow, GetAlertState, Shutdown)
//! ```
//!
//! Cycles run inside the actor loop, so a poll requested while a cycle is in
//! flight waits for it instead of overlapping it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{CycleReport, SchedulerCommand};
use crate::alerts::{Alert, AlertStateDocument, AlertStateTracker};
use crate::cache::{SnapshotCache, SnapshotStore};
use crate::collectors::Collector;
use crate::config::Config;
use crate::monitors::classify;
use crate::notify::NotificationDispatcher;
use crate::registry::TargetRegistry;
use crate::storage::StorageBackend;
use crate::{RunState, Target, TargetStatus};

/// Tunables of the scheduler that are not part of its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Upper bound for a single `Collector::collect` call
    pub collect_timeout: Duration,

    /// Upper bound for handing one batch to the dispatcher
    pub dispatch_timeout: Duration,

    /// Minimum time between two notifications for the same target and
    /// severity
    pub renotify_after: chrono::Duration,

    /// Resolved alert records older than this are dropped; kept forever if
    /// `None`
    pub alert_retention: Option<chrono::Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            collect_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(60),
            renotify_after: chrono::Duration::hours(1),
            alert_retention: None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collect_timeout: config.collect_timeout(),
            dispatch_timeout: config.dispatch_timeout(),
            renotify_after: config.renotify_after(),
            alert_retention: config.alert_retention(),
        }
    }
}

/// Everything a cycle talks to. Owned by the scheduler; cloning only clones
/// the `Arc`s.
#[derive(Clone)]
pub struct MonitorContext {
    pub registry: Arc<dyn TargetRegistry>,
    pub collector: Arc<dyn Collector>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub storage: Arc<dyn StorageBackend>,
    pub store: Arc<SnapshotStore>,
    pub settings: SchedulerSettings,
}

pub struct PollScheduler {
    context: MonitorContext,
    tracker: AlertStateTracker,
}

impl PollScheduler {
    /// Restore the persisted cache and alert state.
    ///
    /// Missing or unreadable state is logged and replaced by an empty one; the
    /// scheduler always comes up.
    pub async fn load(context: MonitorContext) -> Self {
        let storage = context.storage.name();

        match context.storage.load_snapshot().await {
            Ok(Some(cache)) => {
                debug!(
                    "restored snapshot of {} target(s) from {storage}",
                    cache.targets.len()
                );
                context.store.replace(cache);
            }
            Ok(None) => debug!("no stored snapshot in {storage}"),
            Err(e) => warn!("failed to load snapshot from {storage}, starting empty: {e}"),
        }

        let renotify_after = context.settings.renotify_after;
        let tracker = match context.storage.load_alert_state().await {
            Ok(Some(document)) => AlertStateTracker::from_document(document, renotify_after),
            Ok(None) => AlertStateTracker::new(renotify_after),
            Err(e) => {
                warn!("failed to load alert state from {storage}, starting empty: {e}");
                AlertStateTracker::new(renotify_after)
            }
        };
        debug!("alert tracker holds {} record(s)", tracker.len());

        Self { context, tracker }
    }

    /// Load persisted state, spawn the actor and return its handle.
    ///
    /// The first cycle runs immediately, then one per `interval`.
    pub async fn start(context: MonitorContext, interval: Duration) -> SchedulerHandle {
        Self::load(context).await.spawn(interval)
    }

    /// Spawn an already loaded scheduler as a tokio task.
    pub fn spawn(self, interval: Duration) -> SchedulerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let store = self.context.store.clone();

        tokio::spawn(self.run(interval, cmd_rx));

        SchedulerHandle {
            sender: cmd_tx,
            store,
        }
    }

    pub fn tracker(&self) -> &AlertStateTracker {
        &self.tracker
    }

    #[instrument(skip_all, fields(interval = ?period))]
    async fn run(mut self, period: Duration, mut command_rx: mpsc::Receiver<SchedulerCommand>) {
        debug!("starting poll scheduler");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    skip_overdue_tick(&mut ticker);
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SchedulerCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let report = self.run_cycle().await;
                            skip_overdue_tick(&mut ticker);
                            let _ = respond_to.send(report);
                        }

                        Some(SchedulerCommand::GetAlertState { respond_to }) => {
                            let _ = respond_to.send(self.tracker.to_document());
                        }

                        Some(SchedulerCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }

                        None => {
                            debug!("all handles dropped, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("poll scheduler stopped");
        drop(command_rx);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Run one complete cycle. Never fails: every problem is folded into the
    /// statuses or logged.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();

        let targets = match self.context.registry.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!("failed to list targets, checking none this cycle: {e:#}");
                Vec::new()
            }
        };

        let statuses = self.collect_all(&targets).await;
        let finished_at = Utc::now();
        let issues = statuses.iter().filter(|status| status.status.is_issue()).count();

        let cache = self
            .context
            .store
            .replace(SnapshotCache::new(statuses, finished_at));
        if let Err(e) = self.context.storage.save_snapshot(&cache).await {
            error!("failed to persist snapshot cache: {e}");
        }

        let alerts = self.evaluate_alerts(&cache.targets, finished_at);
        self.persist_alert_state().await;

        let dispatch_failed = !alerts.is_empty() && !self.dispatch(&alerts).await;

        let duration = started.elapsed();
        info!(
            "cycle complete: {} target(s) checked in {duration:?} ({issues} issue(s), {} alert(s))",
            cache.targets.len(),
            alerts.len()
        );

        CycleReport {
            targets: cache.targets.len(),
            issues,
            alerts: alerts.len(),
            dispatch_failed,
            duration,
            finished_at,
        }
    }

    async fn collect_all(&self, targets: &[Target]) -> Vec<TargetStatus> {
        let collector = self.context.collector.as_ref();
        let limit = self.context.settings.collect_timeout;

        join_all(
            targets
                .iter()
                .map(|target| collect_one(collector, target, limit)),
        )
        .await
    }

    fn evaluate_alerts(&mut self, statuses: &[TargetStatus], now: DateTime<Utc>) -> Vec<Alert> {
        if let Some(retention) = self.context.settings.alert_retention {
            let pruned = self.tracker.prune_resolved(retention, now);
            if pruned > 0 {
                debug!("pruned {pruned} resolved alert record(s)");
            }
        }

        statuses
            .iter()
            .filter_map(|status| {
                let severity = classify(status);
                self.tracker
                    .evaluate(&status.id, severity, now)
                    .then(|| Alert::new(status, severity, now))
            })
            .collect()
    }

    async fn persist_alert_state(&mut self) {
        if !self.tracker.take_changed() {
            return;
        }

        let document = self.tracker.to_document();
        if let Err(e) = self.context.storage.save_alert_state(&document).await {
            error!("failed to persist alert state: {e}");
        }
    }

    /// Returns whether the batch was handed over successfully.
    async fn dispatch(&self, alerts: &[Alert]) -> bool {
        let limit = self.context.settings.dispatch_timeout;

        match timeout(limit, self.context.dispatcher.dispatch(alerts)).await {
            Ok(Ok(outcome)) => {
                if outcome.failed > 0 {
                    warn!(
                        "alert batch delivered to {} sink(s), {} failed",
                        outcome.delivered, outcome.failed
                    );
                }
                true
            }
            Ok(Err(e)) => {
                error!("failed to dispatch {} alert(s): {e:#}", alerts.len());
                false
            }
            Err(_) => {
                error!("dispatching {} alert(s) timed out after {limit:?}", alerts.len());
                false
            }
        }
    }
}

/// Consume a tick that fell due while a cycle was running, so the next cycle
/// waits for the next period boundary instead of starting right away.
fn skip_overdue_tick(ticker: &mut Interval) {
    if ticker.tick().now_or_never().is_some() {
        debug!("cycle overran the poll interval, skipping missed tick");
    }
}

/// Collect one target, turning errors, panics and timeouts into statuses.
async fn collect_one(collector: &dyn Collector, target: &Target, limit: Duration) -> TargetStatus {
    let guarded = AssertUnwindSafe(collector.collect(target)).catch_unwind();

    match timeout(limit, guarded).await {
        Ok(Ok(Ok(status))) => status,
        Ok(Ok(Err(e))) => {
            warn!("collecting {} failed: {e:#}", target.label());
            TargetStatus::failed(target, RunState::Error, format!("{e:#}"))
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!("collector panicked for {}: {message}", target.label());
            TargetStatus::failed(target, RunState::Error, format!("collector panicked: {message}"))
        }
        Err(_) => {
            warn!("collecting {} timed out after {limit:?}", target.label());
            TargetStatus::failed(
                target,
                RunState::Unreachable,
                format!("collection timed out after {limit:?}"),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Handle for controlling a running [`PollScheduler`]
///
/// This handle provides a typed API for sending commands to the actor.
/// It can be cloned and shared across threads.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    store: Arc<SnapshotStore>,
}

impl SchedulerHandle {
    /// Latest complete snapshot. Does not wait for the actor.
    pub fn snapshot(&self) -> Arc<SnapshotCache> {
        self.store.get()
    }

    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    /// Run a cycle now and wait for its report.
    pub async fn poll_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive cycle report")
    }

    pub async fn alert_state(&self) -> Result<AlertStateDocument> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetAlertState { respond_to: tx })
            .await
            .context("failed to send GetAlertState command")?;

        rx.await.context("failed to receive alert state")
    }

    /// Stop the scheduler and wait until it has exited. An in-flight cycle
    /// completes first. Stopping an already stopped scheduler is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            debug!("scheduler already stopped");
            return Ok(());
        }

        // The actor may have exited between our send and its next receive.
        let _ = rx.await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
