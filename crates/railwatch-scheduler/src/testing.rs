//! Recording fakes for the collaborator traits.

use async_trait::async_trait;
use railwatch_core::error::{RailwatchError, Result};
use railwatch_core::traits::{IncidentSource, Ledger, Notifier, SubscriptionRegistry};
use railwatch_core::types::{Block, Incident, OutboundMessage, Subscription, TextObject};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::memory::MemoryLedger;

/// Scripted incident source. Stations without a script report good service.
#[derive(Default)]
pub struct FakeSource {
    scripts: Mutex<HashMap<String, Vec<Incident>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_incidents(&self, station: &str, incidents: Vec<Incident>) {
        self.scripts.lock().unwrap().insert(station.to_string(), incidents);
    }

    pub fn clear(&self, station: &str) {
        self.scripts.lock().unwrap().remove(station);
    }

    pub fn fail(&self, station: &str) {
        self.failing.lock().unwrap().insert(station.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, station: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| *s == station).count()
    }
}

#[async_trait]
impl IncidentSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_incidents(&self, station_code: &str) -> Result<Vec<Incident>> {
        self.calls.lock().unwrap().push(station_code.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(station_code) {
            return Err(RailwatchError::Source(format!("feed unavailable for {station_code}")));
        }
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .get(station_code)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every message; can be told to reject messages mentioning a string.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    reject: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send sleeps this long before it is recorded.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn reject_containing(&self, needle: &str) {
        self.reject.lock().unwrap().push(needle.to_string());
    }

    pub fn accept_all(&self) {
        self.reject.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

fn message_mentions(message: &OutboundMessage, needle: &str) -> bool {
    message.text.contains(needle)
        || message.blocks.iter().any(|b| match b {
            Block::Section {
                text: TextObject::Mrkdwn { text } | TextObject::PlainText { text },
            } => text.contains(needle),
        })
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, destination_id: &str, message: &OutboundMessage) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejected = self
            .reject
            .lock()
            .unwrap()
            .iter()
            .any(|needle| message_mentions(message, needle));
        if rejected {
            return Err(RailwatchError::Notify("channel_not_found".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination_id.to_string(), message.clone()));
        Ok(())
    }
}

/// Wraps a [`MemoryLedger`] and records each call as `op(args)`.
#[derive(Default)]
pub struct RecordingLedger {
    inner: MemoryLedger,
    calls: Mutex<Vec<String>>,
    broken: Mutex<bool>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    /// Every subsequent operation fails.
    pub fn break_storage(&self) {
        *self.broken.lock().unwrap() = true;
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if *self.broken.lock().unwrap() {
            return Err(RailwatchError::Ledger("storage unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn has_posted(&self, url: &str) -> Result<bool> {
        self.record(format!("has_posted({url})"))?;
        self.inner.has_posted(url).await
    }

    async fn mark_posted(&self, url: &str) -> Result<()> {
        self.record(format!("mark_posted({url})"))?;
        self.inner.mark_posted(url).await
    }

    async fn has_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<bool> {
        self.record(format!("has_good_service_posted({destination_id},{station_code})"))?;
        self.inner.has_good_service_posted(destination_id, station_code).await
    }

    async fn mark_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.record(format!("mark_good_service_posted({destination_id},{station_code})"))?;
        self.inner.mark_good_service_posted(destination_id, station_code).await
    }

    async fn clear_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.record(format!("clear_good_service_posted({destination_id},{station_code})"))?;
        self.inner.clear_good_service_posted(destination_id, station_code).await
    }
}

/// Source that panics on every fetch.
pub struct PanickingSource;

#[async_trait]
impl IncidentSource for PanickingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn fetch_incidents(&self, station_code: &str) -> Result<Vec<Incident>> {
        panic!("feed parser blew up on {station_code}");
    }
}

/// Registry whose listing always fails.
pub struct BrokenRegistry;

#[async_trait]
impl SubscriptionRegistry for BrokenRegistry {
    async fn list_subscriber_ids(&self) -> Result<Vec<String>> {
        Err(RailwatchError::Registry("registry offline".into()))
    }

    async fn get_subscription(&self, _user_id: &str) -> Result<Option<Subscription>> {
        Err(RailwatchError::Registry("registry offline".into()))
    }

    async fn save_subscription(&self, _user_id: &str, _subscription: &Subscription) -> Result<()> {
        Err(RailwatchError::Registry("registry offline".into()))
    }

    async fn remove_subscription(&self, _user_id: &str) -> Result<bool> {
        Err(RailwatchError::Registry("registry offline".into()))
    }
}

pub fn incident(url: &str) -> Incident {
    Incident::new("Delay", "Broken train", url)
}
