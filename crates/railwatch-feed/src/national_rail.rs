//! National Rail service indicator (NSI) feed.
//!
//! The feed is one XML document listing every train operator with its
//! current status. Each service group of a disrupted operator that links to
//! a disruption page becomes an [`Incident`]; a station sees the incidents
//! whose page or description mentions it.

use async_trait::async_trait;
use railwatch_core::config::FeedConfig;
use railwatch_core::error::{RailwatchError, Result};
use railwatch_core::traits::IncidentSource;
use railwatch_core::types::Incident;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::stations::{Station, StationDirectory};

const GOOD_SERVICE: &str = "Good service";
const CUSTOM_STATUS: &str = "Custom";

#[derive(Debug, Deserialize)]
struct NsiFeed {
    #[serde(rename = "TOC", default)]
    operators: Vec<OperatorStatus>,
}

#[derive(Debug, Deserialize)]
struct OperatorStatus {
    #[serde(rename = "TocName", default)]
    name: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "StatusDescription", default)]
    description: String,
    #[serde(rename = "ServiceGroup", default)]
    service_groups: Vec<ServiceGroup>,
}

#[derive(Debug, Deserialize)]
struct ServiceGroup {
    #[serde(rename = "CustomURL", default)]
    custom_url: Option<String>,
}

impl OperatorStatus {
    fn is_disrupted(&self) -> bool {
        self.status != GOOD_SERVICE
    }

    fn title(&self) -> String {
        if self.status == CUSTOM_STATUS {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.status)
        }
    }

    /// One incident per service group that links to a disruption page.
    fn into_incidents(self) -> impl Iterator<Item = Incident> {
        let title = self.title();
        let summary = self.description;
        self.service_groups.into_iter().filter_map(move |group| {
            let url = group.custom_url?;
            let url = url.trim();
            (!url.is_empty()).then(|| Incident::new(title.clone(), summary.clone(), url))
        })
    }
}

/// Every incident in an NSI document, in feed order.
pub fn parse_incidents(xml: &str) -> Result<Vec<Incident>> {
    let feed: NsiFeed = quick_xml::de::from_str(xml)
        .map_err(|e| RailwatchError::Source(format!("Malformed NSI feed: {e}")))?;
    Ok(feed
        .operators
        .into_iter()
        .filter(OperatorStatus::is_disrupted)
        .flat_map(OperatorStatus::into_incidents)
        .collect())
}

/// Incidents relevant to `station`: the URL carries the station slug or the
/// summary names the station.
pub fn filter_for_station(incidents: Vec<Incident>, station: &Station) -> Vec<Incident> {
    let slug = station.slug();
    let name = station.name.to_lowercase();
    incidents
        .into_iter()
        .filter(|i| i.url.to_lowercase().contains(&slug) || i.summary.to_lowercase().contains(&name))
        .collect()
}

pub struct NationalRailSource {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
    stations: Arc<StationDirectory>,
}

impl NationalRailSource {
    pub fn new(config: &FeedConfig, stations: Arc<StationDirectory>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            stations,
        }
    }

    async fn fetch_feed(&self) -> Result<String> {
        let resp = self
            .client
            .get(&self.api_url)
            .header("x-apikey", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RailwatchError::Source(format!("NSI request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RailwatchError::Source(format!("NSI feed returned {status}")));
        }

        resp.text()
            .await
            .map_err(|e| RailwatchError::Source(format!("NSI body unreadable: {e}")))
    }
}

#[async_trait]
impl IncidentSource for NationalRailSource {
    fn name(&self) -> &str {
        "national_rail"
    }

    /// Never fails: an unreachable or malformed feed is logged and reads as
    /// no incidents.
    async fn fetch_incidents(&self, station_code: &str) -> Result<Vec<Incident>> {
        let Some(station) = self.stations.find(station_code) else {
            tracing::warn!("🚉 Unknown station code: {station_code}");
            return Ok(Vec::new());
        };

        let incidents = match self.fetch_feed().await.and_then(|xml| parse_incidents(&xml)) {
            Ok(incidents) => incidents,
            Err(e) => {
                tracing::warn!("⚠️ Failed to fetch incidents for {station_code}: {e}");
                return Ok(Vec::new());
            }
        };

        let relevant = filter_for_station(incidents, &station);
        tracing::debug!("{} incident(s) at {}", relevant.len(), station.crs);
        Ok(relevant)
    }
}
