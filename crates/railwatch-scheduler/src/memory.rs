//! In-memory ledger and subscription registry.
//! Nothing survives a restart; used for dry runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use railwatch_core::error::Result;
use railwatch_core::traits::{Ledger, SubscriptionRegistry};
use railwatch_core::types::{PostedIncidentRecord, ServiceStatus, ServiceStatusRecord, Subscription};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::persistence::posted_incident_id;

#[derive(Default)]
struct MemoryState {
    posted: HashMap<String, PostedIncidentRecord>,
    status: HashMap<(String, String), ServiceStatusRecord>,
    /// Insertion order is registry order.
    subscriptions: Vec<(String, Subscription)>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn posted_count(&self) -> usize {
        self.state.read().await.posted.len()
    }

    pub async fn good_service_record(
        &self,
        destination_id: &str,
        station_code: &str,
    ) -> Option<ServiceStatusRecord> {
        self.state
            .read()
            .await
            .status
            .get(&(destination_id.to_string(), station_code.to_string()))
            .cloned()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn has_posted(&self, url: &str) -> Result<bool> {
        Ok(self.state.read().await.posted.contains_key(&posted_incident_id(url)))
    }

    async fn mark_posted(&self, url: &str) -> Result<()> {
        self.state.write().await.posted.insert(
            posted_incident_id(url),
            PostedIncidentRecord { posted_at: Utc::now() },
        );
        Ok(())
    }

    async fn has_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<bool> {
        Ok(self.good_service_record(destination_id, station_code).await.is_some())
    }

    async fn mark_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.state.write().await.status.insert(
            (destination_id.to_string(), station_code.to_string()),
            ServiceStatusRecord {
                status: ServiceStatus::Good,
                posted_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn clear_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.state
            .write()
            .await
            .status
            .remove(&(destination_id.to_string(), station_code.to_string()));
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryLedger {
    async fn list_subscriber_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, sub)| sub.clone()))
    }

    async fn save_subscription(&self, user_id: &str, subscription: &Subscription) -> Result<()> {
        let subscription = Subscription::from_codes(&subscription.stations);
        let mut state = self.state.write().await;
        match state.subscriptions.iter().position(|(id, _)| id == user_id) {
            Some(i) => state.subscriptions[i].1 = subscription,
            None => state.subscriptions.push((user_id.to_string(), subscription)),
        }
        Ok(())
    }

    async fn remove_subscription(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.subscriptions.len();
        state.subscriptions.retain(|(id, _)| id != user_id);
        Ok(state.subscriptions.len() < before)
    }
}
