//! Poller: the loop that walks every monitored target once per tick.
//!
//! Order within a tick is fixed: the global target first, then users in
//! registry order, then each user's stations in the order they were picked.
//! Ticks are spawned independently, so a slow tick can overlap the next one;
//! every ledger write is idempotent, which makes that safe.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use railwatch_core::traits::{IncidentSource, Ledger, Notifier, SubscriptionRegistry};
use railwatch_core::types::MonitoredTarget;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::reconcile::Reconciler;

/// Summary of one pass over all targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub targets: usize,
    pub reconciled: usize,
    /// Targets skipped because the incident source failed.
    pub source_failures: usize,
    /// Targets whose reconciliation hit a ledger error.
    pub ledger_failures: usize,
    pub notifications_sent: usize,
    pub failed_sends: usize,
}

pub struct Poller {
    source: Arc<dyn IncidentSource>,
    registry: Arc<dyn SubscriptionRegistry>,
    reconciler: Reconciler,
    global: Option<MonitoredTarget>,
    ticks: AtomicU64,
    in_flight: AtomicUsize,
}

impl Poller {
    pub fn new(
        source: Arc<dyn IncidentSource>,
        notifier: Arc<dyn Notifier>,
        ledger: Arc<dyn Ledger>,
        registry: Arc<dyn SubscriptionRegistry>,
    ) -> Self {
        Self {
            source,
            registry,
            reconciler: Reconciler::new(ledger, notifier),
            global: None,
            ticks: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Also watch `station_code` on behalf of `channel_id`.
    pub fn with_global_target(mut self, channel_id: &str, station_code: &str) -> Self {
        self.global = Some(MonitoredTarget::global(channel_id, station_code));
        self
    }

    pub fn global_target(&self) -> Option<&MonitoredTarget> {
        self.global.as_ref()
    }

    /// Number of ticks started so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// All targets for this tick, in poll order.
    /// A registry failure ends the user part of the list; what was gathered is kept.
    pub async fn targets(&self) -> Vec<MonitoredTarget> {
        let mut targets: Vec<MonitoredTarget> = self.global.iter().cloned().collect();

        let user_ids = match self.registry.list_subscriber_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to list subscribers: {e}");
                return targets;
            }
        };

        for user_id in user_ids {
            match self.registry.get_subscription(&user_id).await {
                Ok(Some(subscription)) => targets.extend(
                    subscription
                        .stations
                        .iter()
                        .map(|station| MonitoredTarget::user(&user_id, station)),
                ),
                // Removed between list and get.
                Ok(None) => {}
                Err(e) => tracing::warn!("⚠️ Failed to load subscription for {user_id}: {e}"),
            }
        }

        targets
    }

    /// Ticks started and not yet finished.
    pub fn ticks_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// One pass over every target. Never fails: problems are logged per target.
    ///
    /// A target whose source returns `Err` is skipped for this tick rather
    /// than read as good service, so an outage never announces an all-clear.
    /// `NationalRailSource` absorbs its own failures and never takes this path.
    pub async fn run_tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let (_running, overlapping) = InFlight::enter(&self.in_flight);
        if overlapping > 0 {
            tracing::debug!("Tick #{tick} started with {overlapping} earlier tick(s) still running");
        }
        tracing::debug!("Polling for incidents (tick #{tick})...");

        let mut report = TickReport::default();
        for target in self.targets().await {
            report.targets += 1;

            let incidents = match self.source.fetch_incidents(&target.station_code).await {
                Ok(incidents) => incidents,
                Err(e) => {
                    report.source_failures += 1;
                    tracing::warn!(
                        "⚠️ {} failed for {}, skipping this tick: {e}",
                        self.source.name(),
                        target
                    );
                    continue;
                }
            };

            match self.reconciler.reconcile(&target, &incidents).await {
                Ok(outcome) => {
                    report.reconciled += 1;
                    report.notifications_sent += outcome.sent();
                    report.failed_sends += outcome.failed_sends;
                }
                Err(e) => {
                    report.ledger_failures += 1;
                    tracing::error!("Reconciliation failed for {target}: {e}");
                }
            }
        }

        tracing::info!(
            "⏰ Tick #{tick}: {} target(s), {} sent, {} source failure(s), {} ledger failure(s)",
            report.targets,
            report.notifications_sent,
            report.source_failures,
            report.ledger_failures
        );
        report
    }
}

/// Counts a running tick; the count drops even if the tick panics.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    /// Returns the guard and how many ticks were already running.
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let before = counter.fetch_add(1, Ordering::SeqCst);
        (Self(counter), before)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run one tick as its own task. A panic inside the tick is logged, not propagated.
pub fn spawn_tick(poller: Arc<Poller>) -> JoinHandle<Option<TickReport>> {
    tokio::spawn(async move {
        match tokio::spawn(async move { poller.run_tick().await }).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!("Error during polling: {e}");
                None
            }
        }
    })
}

/// Spawn the polling loop as a background tokio task.
/// The first tick runs immediately, then one tick per `every`; ticks are not
/// awaited by the loop, so a slow tick never delays the next one.
pub fn spawn_poller(poller: Arc<Poller>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("⏰ Poller started (every {}ms)", every.as_millis());

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            spawn_tick(poller.clone());
        }
    })
}
