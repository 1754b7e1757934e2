//! Collaborator traits. The poller only talks to the outside world through these.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Incident, OutboundMessage, Subscription};

/// Supplies the incidents currently active at a station.
/// An empty list means good service.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_incidents(&self, station_code: &str) -> Result<Vec<Incident>>;
}

/// Delivers a message to a channel or direct-message destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, destination_id: &str, message: &OutboundMessage) -> Result<()>;
}

/// Delivery state. Each operation stands alone; none needs a transaction.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Has this incident URL been announced to anyone?
    async fn has_posted(&self, url: &str) -> Result<bool>;

    /// Record that an incident URL was announced. Repeating it is harmless.
    async fn mark_posted(&self, url: &str) -> Result<()>;

    async fn has_good_service_posted(&self, destination_id: &str, station_code: &str)
    -> Result<bool>;

    async fn mark_good_service_posted(&self, destination_id: &str, station_code: &str)
    -> Result<()>;

    /// Re-arm the good-service notice. Clearing an absent record is a no-op.
    async fn clear_good_service_posted(&self, destination_id: &str, station_code: &str)
    -> Result<()>;
}

/// Per-user station subscriptions.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Subscriber ids in registry order.
    async fn list_subscriber_ids(&self) -> Result<Vec<String>>;

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;

    /// Replace a user's station list.
    async fn save_subscription(&self, user_id: &str, subscription: &Subscription) -> Result<()>;

    /// Returns whether anything was removed.
    async fn remove_subscription(&self, user_id: &str) -> Result<bool>;
}
