//! Station directory: CRS code ⇄ station name, loaded once at startup.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;

/// Most results an option search should offer.
pub const MAX_SEARCH_RESULTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub crs: String,
}

impl Station {
    pub fn new(name: &str, crs: &str) -> Self {
        Self {
            name: name.to_string(),
            crs: crs.to_string(),
        }
    }

    /// Name as it appears in disruption URLs: lower-case, spaces as dashes.
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }
}

/// Entry in the published station list.
#[derive(Debug, Deserialize)]
struct FetchedStation {
    #[serde(rename = "stationName")]
    station_name: String,
    #[serde(rename = "crsCode", default)]
    crs_code: Option<String>,
}

#[derive(Default)]
pub struct StationDirectory {
    stations: RwLock<Vec<Station>>,
}

impl StationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stations(stations: Vec<Station>) -> Self {
        Self {
            stations: RwLock::new(stations),
        }
    }

    /// A directory filled from `url`; empty if the list cannot be fetched.
    pub async fn load(url: &str, timeout: Duration) -> Self {
        let directory = Self::new();
        directory.fetch(&reqwest::Client::new(), url, timeout).await;
        directory
    }

    /// Load the station list from `url`. On failure the directory keeps its
    /// previous contents and the error is logged. Returns the station count.
    pub async fn fetch(&self, client: &reqwest::Client, url: &str, timeout: Duration) -> usize {
        tracing::info!("Fetching stations...");
        let fetched = async {
            let resp = client.get(url).timeout(timeout).send().await?.error_for_status()?;
            resp.json::<Vec<FetchedStation>>().await
        }
        .await;

        match fetched {
            Ok(list) => {
                let stations = parse_station_list(list);
                let count = stations.len();
                self.replace(stations);
                tracing::info!("Loaded {count} stations.");
                count
            }
            Err(e) => {
                tracing::error!("Initial station load failed: {e}");
                self.len()
            }
        }
    }

    fn replace(&self, stations: Vec<Station>) {
        match self.stations.write() {
            Ok(mut guard) => *guard = stations,
            Err(poisoned) => *poisoned.into_inner() = stations,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Station>> {
        self.stations.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Exact, case-insensitive CRS lookup.
    pub fn find(&self, crs: &str) -> Option<Station> {
        let crs = crs.trim();
        self.read().iter().find(|s| s.crs.eq_ignore_ascii_case(crs)).cloned()
    }

    /// Case-insensitive substring match on name or CRS, in directory order.
    pub fn search(&self, term: &str) -> Vec<Station> {
        let term = term.trim().to_lowercase();
        self.read()
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&term) || s.crs.to_lowercase().contains(&term))
            .take(MAX_SEARCH_RESULTS)
            .cloned()
            .collect()
    }
}

fn parse_station_list(list: Vec<FetchedStation>) -> Vec<Station> {
    list.into_iter()
        .filter_map(|s| {
            let crs = s.crs_code?.trim().to_uppercase();
            (!crs.is_empty()).then(|| Station {
                name: s.station_name,
                crs,
            })
        })
        .collect()
}
