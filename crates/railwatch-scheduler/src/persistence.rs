//! SQLite-backed delivery ledger and subscription registry.
//! One database file holds posted incidents, good-service flags and user settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use railwatch_core::error::{RailwatchError, Result};
use railwatch_core::traits::{Ledger, SubscriptionRegistry};
use railwatch_core::types::{ServiceStatus, ServiceStatusRecord, Subscription};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Document id for a posted incident: the percent-encoded URL.
pub fn posted_incident_id(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

/// SQLite-backed ledger. Also serves as the subscription registry.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| RailwatchError::Ledger(format!("DB open: {e}")))?;
        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        tracing::debug!("💾 Ledger opened at {}", path.display());
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RailwatchError::Ledger(format!("DB open: {e}")))?;
        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- Incident URLs already announced (to anyone)
            CREATE TABLE IF NOT EXISTS posted_incidents (
                id TEXT PRIMARY KEY,             -- percent-encoded url
                url TEXT NOT NULL,
                posted_at TEXT NOT NULL
            );

            -- Good-service notices already sent, per destination + station
            CREATE TABLE IF NOT EXISTS station_status (
                destination_id TEXT NOT NULL,
                station_code TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'good',
                posted_at TEXT NOT NULL,
                PRIMARY KEY (destination_id, station_code)
            );

            -- Per-user station subscriptions; rowid order is poll order
            CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                stations TEXT NOT NULL DEFAULT '[]',   -- JSON array of CRS codes
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| RailwatchError::Ledger(format!("Migration: {e}")))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RailwatchError::Ledger(format!("Connection lock poisoned: {e}")))
    }

    /// Number of incident URLs ever announced.
    pub fn posted_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM posted_incidents", [], |r| r.get(0))
            .map_err(|e| RailwatchError::Ledger(format!("Count posted: {e}")))?;
        Ok(count as usize)
    }

    /// The good-service record for a pair, if one is present.
    pub fn good_service_record(
        &self,
        destination_id: &str,
        station_code: &str,
    ) -> Result<Option<ServiceStatusRecord>> {
        let posted_at: Option<String> = self
            .conn()?
            .query_row(
                "SELECT posted_at FROM station_status WHERE destination_id = ?1 AND station_code = ?2",
                rusqlite::params![destination_id, station_code],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| RailwatchError::Ledger(format!("Read station status: {e}")))?;

        posted_at
            .map(|s| -> Result<ServiceStatusRecord> {
                let posted_at = DateTime::parse_from_rfc3339(&s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| {
                        RailwatchError::Ledger(format!(
                            "Corrupt posted_at {s:?} for {station_code}@{destination_id}: {e}"
                        ))
                    })?;
                Ok(ServiceStatusRecord {
                    status: ServiceStatus::Good,
                    posted_at,
                })
            })
            .transpose()
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn has_posted(&self, url: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM posted_incidents WHERE id = ?1",
                [posted_incident_id(url)],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| RailwatchError::Ledger(format!("Read posted incident: {e}")))?;
        Ok(found.is_some())
    }

    async fn mark_posted(&self, url: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO posted_incidents (id, url, posted_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![posted_incident_id(url), url, Utc::now().to_rfc3339()],
            )
            .map_err(|e| RailwatchError::Ledger(format!("Mark posted: {e}")))?;
        Ok(())
    }

    async fn has_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM station_status WHERE destination_id = ?1 AND station_code = ?2",
                rusqlite::params![destination_id, station_code],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| RailwatchError::Ledger(format!("Read station status: {e}")))?;
        Ok(found.is_some())
    }

    async fn mark_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO station_status (destination_id, station_code, status, posted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    destination_id,
                    station_code,
                    ServiceStatus::Good.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| RailwatchError::Ledger(format!("Mark good service: {e}")))?;
        Ok(())
    }

    async fn clear_good_service_posted(&self, destination_id: &str, station_code: &str) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM station_status WHERE destination_id = ?1 AND station_code = ?2",
                rusqlite::params![destination_id, station_code],
            )
            .map_err(|e| RailwatchError::Ledger(format!("Clear good service: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for SqliteLedger {
    async fn list_subscriber_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM user_settings ORDER BY rowid")
            .map_err(|e| RailwatchError::Registry(format!("List subscribers: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| RailwatchError::Registry(format!("List subscribers: {e}")))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RailwatchError::Registry(format!("List subscribers: {e}")))
    }

    async fn get_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let stations: Option<String> = self
            .conn()?
            .query_row(
                "SELECT stations FROM user_settings WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| RailwatchError::Registry(format!("Get subscription: {e}")))?;

        match stations {
            Some(json) => {
                let stations: Vec<String> = serde_json::from_str(&json)?;
                Ok(Some(Subscription { stations }))
            }
            None => Ok(None),
        }
    }

    async fn save_subscription(&self, user_id: &str, subscription: &Subscription) -> Result<()> {
        let subscription = Subscription::from_codes(&subscription.stations);
        let stations = serde_json::to_string(&subscription.stations)?;
        // Upsert keeps the original rowid, so re-saving does not change poll order.
        self.conn()?
            .execute(
                "INSERT INTO user_settings (user_id, stations, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET stations = excluded.stations, updated_at = excluded.updated_at",
                rusqlite::params![user_id, stations, Utc::now().to_rfc3339()],
            )
            .map_err(|e| RailwatchError::Registry(format!("Save subscription: {e}")))?;
        Ok(())
    }

    async fn remove_subscription(&self, user_id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM user_settings WHERE user_id = ?1", [user_id])
            .map_err(|e| RailwatchError::Registry(format!("Remove subscription: {e}")))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posted_incident_id_is_percent_encoded() {
        assert_eq!(
            posted_incident_id("http://incident/1?a=b"),
            "http%3A%2F%2Fincident%2F1%3Fa%3Db"
        );
    }

    #[tokio::test]
    async fn test_mark_posted_twice_is_harmless() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        assert!(!ledger.has_posted("http://incident/1").await.unwrap());
        ledger.mark_posted("http://incident/1").await.unwrap();
        ledger.mark_posted("http://incident/1").await.unwrap();
        assert!(ledger.has_posted("http://incident/1").await.unwrap());
        assert!(!ledger.has_posted("http://incident/2").await.unwrap());
        assert_eq!(ledger.posted_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_good_service_lifecycle() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.clear_good_service_posted("C123", "WAT").await.unwrap();
        assert!(!ledger.has_good_service_posted("C123", "WAT").await.unwrap());

        ledger.mark_good_service_posted("C123", "WAT").await.unwrap();
        assert!(ledger.has_good_service_posted("C123", "WAT").await.unwrap());
        assert!(!ledger.has_good_service_posted("C12", "3WAT").await.unwrap());
        let record = ledger.good_service_record("C123", "WAT").unwrap().unwrap();
        assert_eq!(record.status, ServiceStatus::Good);

        ledger.clear_good_service_posted("C123", "WAT").await.unwrap();
        assert!(!ledger.has_good_service_posted("C123", "WAT").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_is_reported() {
        let ledger = SqliteLedger::open_in_memory().unwrap();
        ledger
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO station_status (destination_id, station_code, status, posted_at)
                 VALUES ('C123', 'WAT', 'good', 'yesterday')",
                [],
            )
            .unwrap();

        let err = ledger.good_service_record("C123", "WAT").unwrap_err();
        assert!(matches!(err, RailwatchError::Ledger(_)));
        assert!(err.to_string().contains("yesterday"));
        // The flag itself is still readable, so polling is not blocked.
        assert!(ledger.has_good_service_posted("C123", "WAT").await.unwrap());
    }

    #[tokio::test]
    async fn test_subscriptions_survive_reopen() {
        let dir = std::env::temp_dir().join("railwatch-test-ledger");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("railwatch.db");
        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger
                .save_subscription("U1", &Subscription::from_codes(["abc", "def"]))
                .await
                .unwrap();
            ledger
                .save_subscription("U2", &Subscription::from_codes(["ghi"]))
                .await
                .unwrap();
            ledger
                .save_subscription("U1", &Subscription::from_codes(["xyz"]))
                .await
                .unwrap();
            ledger.mark_posted("http://incident/9").await.unwrap();
        }

        let ledger = SqliteLedger::open(&path).unwrap();
        assert_eq!(ledger.list_subscriber_ids().await.unwrap(), vec!["U1", "U2"]);
        assert_eq!(
            ledger.get_subscription("U1").await.unwrap(),
            Some(Subscription { stations: vec!["XYZ".into()] })
        );
        assert!(ledger.has_posted("http://incident/9").await.unwrap());

        assert!(ledger.remove_subscription("U1").await.unwrap());
        assert!(ledger.get_subscription("U1").await.unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
