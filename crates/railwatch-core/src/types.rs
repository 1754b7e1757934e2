//! Data model shared between the poller and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An active disruption notice for a station.
/// The `url` identifies the notice; only the URL is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub title: String,
    pub summary: String,
    pub url: String,
}

impl Incident {
    pub fn new(title: impl Into<String>, summary: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            url: url.into(),
        }
    }
}

/// Where a monitored target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// The single station/channel pair from static configuration.
    Global,
    /// A station picked by an individual user; the destination is the user id.
    User,
}

/// A (destination, station) pair that is reconciled on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub destination_id: String,
    pub station_code: String,
    pub kind: TargetKind,
}

impl MonitoredTarget {
    pub fn global(destination_id: &str, station_code: &str) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            station_code: station_code.to_string(),
            kind: TargetKind::Global,
        }
    }

    pub fn user(user_id: &str, station_code: &str) -> Self {
        Self {
            destination_id: user_id.to_string(),
            station_code: station_code.to_string(),
            kind: TargetKind::User,
        }
    }
}

impl std::fmt::Display for MonitoredTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.station_code, self.destination_id)
    }
}

/// Stations a user has asked to monitor, in the order they picked them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub stations: Vec<String>,
}

impl Subscription {
    /// Build a subscription from raw station codes: trimmed, upper-cased,
    /// blanks dropped and duplicates removed keeping first occurrence.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stations: Vec<String> = Vec::new();
        for code in codes {
            let code = normalize_station_code(code.as_ref());
            if !code.is_empty() && !stations.contains(&code) {
                stations.push(code);
            }
        }
        Self { stations }
    }
}

/// CRS codes are compared upper-case.
pub fn normalize_station_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// The only status a service-status record can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Good,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Good => "good",
        }
    }
}

/// Ledger row: "this destination was told this station has good service".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusRecord {
    pub status: ServiceStatus,
    pub posted_at: DateTime<Utc>,
}

/// Ledger row: "this incident URL was announced".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedIncidentRecord {
    pub posted_at: DateTime<Utc>,
}

/// Text object inside a rich block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Mrkdwn { text: String },
    PlainText { text: String },
}

/// Structured message body, serialized in Slack Block Kit shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
}

impl Block {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Block::Section {
            text: TextObject::Mrkdwn { text: text.into() },
        }
    }
}

/// A message ready for a [`crate::Notifier`]: plain fallback text plus optional blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_normalizes_codes() {
        let sub = Subscription::from_codes(["wat", " KGX ", "WAT", ""]);
        assert_eq!(sub.stations, vec!["WAT", "KGX"]);
    }

    #[test]
    fn test_block_serializes_as_block_kit() {
        let block = Block::mrkdwn("*Delay*");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "section", "text": {"type": "mrkdwn", "text": "*Delay*"}})
        );
    }

    #[test]
    fn test_text_only_message_omits_blocks() {
        let json = serde_json::to_value(OutboundMessage::text("hi")).unwrap();
        assert!(json.get("blocks").is_none());
    }

    #[test]
    fn test_target_display() {
        let target = MonitoredTarget::user("U1", "ABC");
        assert_eq!(target.to_string(), "ABC@U1");
        assert_eq!(target.kind, TargetKind::User);
    }
}
