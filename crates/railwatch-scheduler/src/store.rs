//! Ledger backend selection: SQLite on disk, or in memory for dry runs.

use railwatch_core::config::RailwatchConfig;
use railwatch_core::error::Result;
use railwatch_core::traits::{Ledger, SubscriptionRegistry};
use railwatch_core::types::ServiceStatusRecord;
use std::sync::Arc;

use crate::memory::MemoryLedger;
use crate::persistence::SqliteLedger;

/// The configured ledger backend. Each backend is also the subscription registry.
#[derive(Clone)]
pub enum LedgerStore {
    Sqlite(Arc<SqliteLedger>),
    Memory(Arc<MemoryLedger>),
}

impl LedgerStore {
    /// Open the backend named by `ledger.backend`.
    pub fn open(config: &RailwatchConfig) -> Result<Self> {
        match config.ledger.backend.as_str() {
            "memory" => {
                tracing::warn!("⚠️ Using in-memory ledger: delivery state is lost on restart");
                Ok(Self::Memory(Arc::new(MemoryLedger::new())))
            }
            _ => Ok(Self::Sqlite(Arc::new(SqliteLedger::open(&config.db_path())?))),
        }
    }

    pub fn ledger(&self) -> Arc<dyn Ledger> {
        match self {
            Self::Sqlite(db) => db.clone() as Arc<dyn Ledger>,
            Self::Memory(mem) => mem.clone() as Arc<dyn Ledger>,
        }
    }

    pub fn registry(&self) -> Arc<dyn SubscriptionRegistry> {
        match self {
            Self::Sqlite(db) => db.clone() as Arc<dyn SubscriptionRegistry>,
            Self::Memory(mem) => mem.clone() as Arc<dyn SubscriptionRegistry>,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
        }
    }

    pub async fn posted_count(&self) -> Result<usize> {
        match self {
            Self::Sqlite(db) => db.posted_count(),
            Self::Memory(mem) => Ok(mem.posted_count().await),
        }
    }

    pub async fn good_service_record(
        &self,
        destination_id: &str,
        station_code: &str,
    ) -> Result<Option<ServiceStatusRecord>> {
        match self {
            Self::Sqlite(db) => db.good_service_record(destination_id, station_code),
            Self::Memory(mem) => Ok(mem.good_service_record(destination_id, station_code).await),
        }
    }
}
