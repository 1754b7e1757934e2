//! # Railwatch Scheduler
//!
//! Polls the incident source for every monitored target, decides what to
//! announce, and keeps the delivery ledger so nothing is announced twice.
//!
//! ## Architecture
//! ```text
//! Poller (tokio interval, one spawned task per tick)
//!   ├── global target:  (SLACK_CHANNEL_ID, STATION_CRS)
//!   ├── user targets:   (user id, station) for each subscription
//!   └── per target → IncidentSource → Reconciler
//!                                       ├── Ledger (posted URLs, good-service flags)
//!                                       └── Notifier
//! ```

pub mod engine;
pub mod memory;
pub mod notify;
pub mod persistence;
pub mod reconcile;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Poller, TickReport, spawn_poller, spawn_tick};
pub use memory::MemoryLedger;
pub use persistence::SqliteLedger;
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use store::LedgerStore;
