//! Reconciliation: compare one target's current incidents with the ledger and
//! decide what to announce.
//!
//! Incidents present:
//!   - each URL never announced (to anyone) is sent, then marked posted
//!   - the target's good-service record is cleared so the next all-clear is sent
//!
//! No incidents:
//!   - good service is sent once, then recorded, until incidents reappear
//!
//! Ledger errors end the reconciliation with `Err`. Send failures are counted
//! and logged; they are not retried within the same reconciliation.
//!
//! Overlapping ticks share one reconciler. A URL is claimed before the ledger
//! check and released once it is marked posted (or the send failed), so two
//! ticks never announce the same URL at once.

use railwatch_core::error::Result;
use railwatch_core::traits::{Ledger, Notifier};
use railwatch_core::types::{Incident, MonitoredTarget};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::notify::{good_service_message, incident_message};

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Incident notices delivered and marked posted.
    pub posted: usize,
    /// Incidents skipped because their URL was announced before.
    pub already_posted: usize,
    /// Notices (incident or good service) the notifier rejected.
    pub failed_sends: usize,
    pub good_service_posted: bool,
}

impl ReconcileOutcome {
    /// Messages actually delivered.
    pub fn sent(&self) -> usize {
        self.posted + usize::from(self.good_service_posted)
    }
}

/// Incident URLs currently being announced by some tick.
#[derive(Default)]
struct Claims {
    urls: Mutex<HashSet<String>>,
}

impl Claims {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `None` if another tick holds the URL.
    fn claim(&self, url: &str) -> Option<Claim<'_>> {
        self.lock().insert(url.to_string()).then(|| Claim {
            claims: self,
            url: url.to_string(),
        })
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Released on drop, whether the announcement succeeded, failed or errored.
struct Claim<'a> {
    claims: &'a Claims,
    url: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.url);
    }
}

pub struct Reconciler {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    claims: Claims,
}

impl Reconciler {
    pub fn new(ledger: Arc<dyn Ledger>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ledger,
            notifier,
            claims: Claims::default(),
        }
    }

    /// Whether some reconciliation is between sending a URL and recording it.
    pub fn has_pending_claims(&self) -> bool {
        !self.claims.is_empty()
    }

    pub async fn reconcile(
        &self,
        target: &MonitoredTarget,
        incidents: &[Incident],
    ) -> Result<ReconcileOutcome> {
        if incidents.is_empty() {
            self.reconcile_good_service(target).await
        } else {
            self.reconcile_incidents(target, incidents).await
        }
    }

    async fn reconcile_incidents(
        &self,
        target: &MonitoredTarget,
        incidents: &[Incident],
    ) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();

        for incident in incidents {
            let Some(_claim) = self.claims.claim(&incident.url) else {
                tracing::debug!("{} is being announced by another tick", incident.url);
                outcome.already_posted += 1;
                continue;
            };

            // Dedup is by URL alone, across every destination and station.
            if self.ledger.has_posted(&incident.url).await? {
                outcome.already_posted += 1;
                continue;
            }

            let message = incident_message(&target.station_code, incident);
            match self.notifier.send(&target.destination_id, &message).await {
                Ok(()) => {
                    self.ledger.mark_posted(&incident.url).await?;
                    outcome.posted += 1;
                    tracing::info!(
                        "📣 Incident at {} sent to {}: {}",
                        target.station_code,
                        target.destination_id,
                        incident.url
                    );
                }
                Err(e) => {
                    outcome.failed_sends += 1;
                    tracing::warn!(
                        "⚠️ Failed to send incident {} to {}: {e}",
                        incident.url,
                        target.destination_id
                    );
                }
            }
        }

        self.ledger
            .clear_good_service_posted(&target.destination_id, &target.station_code)
            .await?;

        Ok(outcome)
    }

    async fn reconcile_good_service(&self, target: &MonitoredTarget) -> Result<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();

        if self
            .ledger
            .has_good_service_posted(&target.destination_id, &target.station_code)
            .await?
        {
            return Ok(outcome);
        }

        let message = good_service_message(&target.station_code);
        match self.notifier.send(&target.destination_id, &message).await {
            Ok(()) => {
                self.ledger
                    .mark_good_service_posted(&target.destination_id, &target.station_code)
                    .await?;
                outcome.good_service_posted = true;
                tracing::debug!(
                    "Posted good service for {} in {}",
                    target.station_code,
                    target.destination_id
                );
            }
            Err(e) => {
                outcome.failed_sends += 1;
                tracing::warn!(
                    "⚠️ Failed to send good service for {} to {}: {e}",
                    target.station_code,
                    target.destination_id
                );
            }
        }

        Ok(outcome)
    }
}
