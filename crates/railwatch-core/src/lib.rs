//! # Railwatch Core
//!
//! Shared vocabulary for the Railwatch crates: configuration, the error type,
//! the data model and the collaborator traits the poller is wired against.
//!
//! ```text
//! Poller (tokio interval)
//!   ├── IncidentSource      → current incidents for a station
//!   ├── Ledger              → posted incident URLs + good-service flags
//!   ├── SubscriptionRegistry→ per-user station lists
//!   └── Notifier            → delivers formatted messages
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RailwatchConfig;
pub use error::{RailwatchError, Result};
pub use traits::{IncidentSource, Ledger, Notifier, SubscriptionRegistry};
pub use types::{Block, Incident, MonitoredTarget, OutboundMessage, ServiceStatus, Subscription};
